use crate::compute::{
    ComputeStateMachine, ComputeStatus, ComputeTerminationHandler, DEFAULT_TERMINATION_DELAY,
};
use crate::error::Result;
use crate::process::{ProcessId, ProcessRegistry, ProcessTerminationReason, ProcessTerminator};
use crate::reconcile::counter::UnregisteredProcessCounter;
use crate::retry::RetryPolicy;
use crate::transport::{ControlPlaneClient, HeartbeatRequest, HeartbeatResponse};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Brings local compute and process state in line with a heartbeat response.
pub struct HeartbeatReconciler {
    state: Arc<ComputeStateMachine>,
    terminator: Arc<dyn ProcessTerminator>,
    termination: Arc<dyn ComputeTerminationHandler>,
    unregistered: UnregisteredProcessCounter,
    termination_delay: Duration,
}

impl HeartbeatReconciler {
    pub fn new(
        state: Arc<ComputeStateMachine>,
        terminator: Arc<dyn ProcessTerminator>,
        termination: Arc<dyn ComputeTerminationHandler>,
    ) -> Self {
        Self {
            state,
            terminator,
            termination,
            unregistered: UnregisteredProcessCounter::new(),
            termination_delay: DEFAULT_TERMINATION_DELAY,
        }
    }

    /// Replaces the unregistered-process counter, e.g. to change its threshold.
    pub fn with_counter(mut self, counter: UnregisteredProcessCounter) -> Self {
        self.unregistered = counter;
        self
    }

    pub fn unregistered_counter(&self) -> &UnregisteredProcessCounter {
        &self.unregistered
    }

    /// Reconciles one heartbeat response.
    ///
    /// Unhealthy and long-unregistered processes are terminated on every
    /// call. The reported compute status is only looked at while local
    /// compute is not terminating. A failure on one process is logged and
    /// does not stop the others.
    pub async fn reconcile(&self, response: &HeartbeatResponse) {
        let terminating = self.state.is_terminating_or_terminated();

        for id in parse_ids(&response.unhealthy_processes) {
            tracing::info!(process_id = %id, "Control plane reports process unhealthy");
            self.terminate(id, ProcessTerminationReason::ServerProcessTerminatedUnhealthy)
                .await;
        }

        let unregistered = parse_ids(&response.unregistered_processes);
        for id in self.unregistered.record(&unregistered) {
            tracing::warn!(process_id = %id, "Process never registered with the control plane");
            self.terminate(id, ProcessTerminationReason::ServerProcessSdkInitializationTimeout)
                .await;
        }

        if terminating {
            return;
        }
        if let Some(reported) = response.status.as_deref() {
            self.reconcile_status(reported);
        }
    }

    fn reconcile_status(&self, reported: &str) {
        let reported = match reported.parse::<ComputeStatus>() {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring reported compute status");
                return;
            }
        };
        let local = self.state.status();

        match (reported, local) {
            (ComputeStatus::Terminated, local) if local != ComputeStatus::Terminated => {
                tracing::info!("Control plane reports compute terminated");
                self.termination.complete_termination_now();
            }
            (ComputeStatus::Terminating, local) if local != ComputeStatus::Terminating => {
                let deadline = Utc::now()
                    + chrono::Duration::from_std(self.termination_delay)
                        .unwrap_or_else(|_| chrono::Duration::minutes(5));
                tracing::info!(%deadline, "Control plane reports compute terminating");
                self.termination.request_termination(deadline, false);
            }
            (ComputeStatus::Active, local) if local != ComputeStatus::Active => {
                if let Err(e) = self.state.transition_to(ComputeStatus::Active) {
                    tracing::warn!(error = %e, "Could not follow control plane to Active");
                }
            }
            (ComputeStatus::Initializing, ComputeStatus::Initializing) => {
                if let Err(e) = self.state.begin_activation() {
                    tracing::warn!(error = %e, "Could not begin activation");
                }
            }
            _ => {}
        }
    }

    async fn terminate(&self, id: ProcessId, reason: ProcessTerminationReason) {
        if let Err(e) = self.terminator.terminate_process(id, reason).await {
            tracing::error!(process_id = %id, %reason, error = %e, "Failed to terminate process");
        }
    }
}

fn parse_ids(raw: &[String]) -> Vec<ProcessId> {
    raw.iter()
        .filter_map(|s| match s.parse::<ProcessId>() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed process id");
                None
            }
        })
        .collect()
}

/// Sends heartbeats and feeds the responses to the reconciler.
pub struct HeartbeatSender {
    client: Arc<dyn ControlPlaneClient>,
    state: Arc<ComputeStateMachine>,
    registry: ProcessRegistry,
    reconciler: Arc<HeartbeatReconciler>,
    retry: RetryPolicy,
    max_retries: u32,
}

impl HeartbeatSender {
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        state: Arc<ComputeStateMachine>,
        registry: ProcessRegistry,
        reconciler: Arc<HeartbeatReconciler>,
        retry: RetryPolicy,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            state,
            registry,
            reconciler,
            retry,
            max_retries,
        }
    }

    pub fn build_request(&self) -> HeartbeatRequest {
        let mut process_list = self.registry.ids();
        process_list.sort();
        HeartbeatRequest {
            status: self.state.status(),
            process_list,
            heartbeat_time: Utc::now(),
        }
    }

    /// Sends one heartbeat and reconciles the response.
    pub async fn send_once(&self) -> Result<()> {
        let request = self.build_request();
        tracing::debug!(status = %request.status, processes = request.process_list.len(), "Sending heartbeat");

        let client = &self.client;
        let response = self
            .retry
            .run_retryable(self.max_retries, true, move || {
                client.send_heartbeat(request.clone())
            })
            .await?;

        self.reconciler.reconcile(&response).await;
        Ok(())
    }
}
