use crate::compute::state::ComputeStateMachine;
use crate::compute::terminator::ComputeTerminationHandler;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Source of external interruption notices, such as the instance metadata
/// endpoint of a spot instance.
#[async_trait]
pub trait InterruptionSource: Send + Sync {
    /// Returns the time the host will be reclaimed, if a notice is out.
    async fn poll(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Source for hosts that are never interrupted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterruptions;

#[async_trait]
impl InterruptionSource for NoInterruptions {
    async fn poll(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

/// Turns the first interruption notice into a compute termination.
pub struct InterruptionMonitor {
    source: Arc<dyn InterruptionSource>,
    state: Arc<ComputeStateMachine>,
    termination: Arc<dyn ComputeTerminationHandler>,
    fired: AtomicBool,
}

impl InterruptionMonitor {
    pub fn new(
        source: Arc<dyn InterruptionSource>,
        state: Arc<ComputeStateMachine>,
        termination: Arc<dyn ComputeTerminationHandler>,
    ) -> Self {
        Self {
            source,
            state,
            termination,
            fired: AtomicBool::new(false),
        }
    }

    /// Polls the source once. Returns `true` when this call started the
    /// termination.
    pub async fn check(&self) -> Result<bool> {
        if self.fired.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let Some(termination_time) = self.source.poll().await? else {
            return Ok(false);
        };
        if self.fired.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        tracing::warn!(%termination_time, "Interruption notice received");
        if let Err(e) = self.state.interrupt() {
            tracing::debug!(error = %e, "Compute not marked interrupted");
        }
        self.termination.request_termination(termination_time, true);
        Ok(true)
    }
}
