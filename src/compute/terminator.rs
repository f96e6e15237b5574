use crate::compute::state::{ComputeStateMachine, ComputeStatus};
use crate::process::{ProcessManager, ProcessTerminationReason};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Grace period given to processes when termination is requested without
/// an explicit deadline.
pub const DEFAULT_TERMINATION_DELAY: Duration = Duration::from_secs(5 * 60);

/// Entry points for shutting compute down. Both calls return immediately.
pub trait ComputeTerminationHandler: Send + Sync {
    /// Starts a graceful shutdown that must finish by `deadline`.
    fn request_termination(&self, deadline: DateTime<Utc>, is_spot_interruption: bool);

    /// Kills every process now and marks compute terminated.
    fn complete_termination_now(&self);
}

/// Drives compute from `Terminating` to `Terminated`.
///
/// A graceful request waits for processes to exit on their own until the
/// deadline, then kills whatever is left. The work runs on a background task.
pub struct ComputeTerminator {
    state: Arc<ComputeStateMachine>,
    manager: Arc<ProcessManager>,
    poll_interval: Duration,
    runtime: Option<Handle>,
}

impl ComputeTerminator {
    /// Creates a terminator. When called inside a Tokio runtime, that runtime
    /// is used for background work requested from outside it.
    pub fn new(
        state: Arc<ComputeStateMachine>,
        manager: Arc<ProcessManager>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state,
            manager,
            poll_interval,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Resolves once compute is `Terminated`.
    pub async fn wait_terminated(&self) {
        self.state
            .wait_until(|s| *s == ComputeStatus::Terminated)
            .await;
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current().ok().or_else(|| self.runtime.clone()) {
            Some(handle) => {
                handle.spawn(task);
            }
            None => tracing::error!("No async runtime available to run compute termination"),
        }
    }

    async fn drain(
        state: Arc<ComputeStateMachine>,
        manager: Arc<ProcessManager>,
        poll_interval: Duration,
        deadline: DateTime<Utc>,
    ) {
        loop {
            if let Err(e) = manager.supervise().await {
                tracing::warn!(error = %e, "Supervision pass failed while draining");
            }
            if manager.registry().is_empty() {
                tracing::info!("All server processes exited");
                break;
            }
            let now = Utc::now();
            if now >= deadline {
                tracing::warn!(
                    remaining = manager.registry().len(),
                    "Termination deadline reached, killing remaining server processes"
                );
                break;
            }
            let until_deadline = (deadline - now).to_std().unwrap_or_default();
            tokio::time::sleep(poll_interval.min(until_deadline)).await;
        }

        manager
            .terminate_all(ProcessTerminationReason::ComputeShuttingDown)
            .await;
        finish(&state);
    }
}

fn finish(state: &ComputeStateMachine) {
    match state.transition_to(ComputeStatus::Terminated) {
        Ok(true) => tracing::info!("Compute terminated"),
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "Failed to mark compute terminated"),
    }
}

impl ComputeTerminationHandler for ComputeTerminator {
    fn request_termination(&self, deadline: DateTime<Utc>, is_spot_interruption: bool) {
        match self.state.transition_to(ComputeStatus::Terminating) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Termination already in progress");
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring termination request");
                return;
            }
        }

        tracing::info!(%deadline, is_spot_interruption, "Compute termination requested");
        self.spawn(Self::drain(
            Arc::clone(&self.state),
            Arc::clone(&self.manager),
            self.poll_interval,
            deadline,
        ));
    }

    fn complete_termination_now(&self) {
        if self.state.status() == ComputeStatus::Terminated {
            return;
        }
        if let Err(e) = self.state.transition_to(ComputeStatus::Terminating) {
            tracing::debug!(error = %e, "Compute already past terminating");
        }

        tracing::info!("Terminating compute immediately");
        let state = Arc::clone(&self.state);
        let manager = Arc::clone(&self.manager);
        self.spawn(async move {
            manager
                .terminate_all(ProcessTerminationReason::ComputeShuttingDown)
                .await;
            finish(&state);
        });
    }
}
