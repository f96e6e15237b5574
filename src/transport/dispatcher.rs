use crate::compute::{ComputeTerminationHandler, DEFAULT_TERMINATION_DELAY};
use crate::error::{Error, Result};
use crate::process::{ProcessId, ProcessRegistry, ProcessTerminationReason, ProcessTerminator};
use crate::reconcile::HeartbeatReconciler;
use crate::transport::messages::InboundMessage;
use chrono::Utc;
use std::sync::Arc;

/// Routes messages pushed by the control plane to the component that owns
/// them. Handler failures are logged, never returned.
pub struct MessageDispatcher {
    registry: ProcessRegistry,
    terminator: Arc<dyn ProcessTerminator>,
    termination: Arc<dyn ComputeTerminationHandler>,
    reconciler: Arc<HeartbeatReconciler>,
}

impl MessageDispatcher {
    pub fn new(
        registry: ProcessRegistry,
        terminator: Arc<dyn ProcessTerminator>,
        termination: Arc<dyn ComputeTerminationHandler>,
        reconciler: Arc<HeartbeatReconciler>,
    ) -> Self {
        Self {
            registry,
            terminator,
            termination,
            reconciler,
        }
    }

    /// Parses and handles one raw message.
    ///
    /// Messages with an unknown `Action` are dropped.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] when the text is not JSON, or a known action
    /// has an unusable payload.
    pub async fn dispatch_json(&self, raw: &str) -> Result<()> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let action = value
            .get("Action")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value::<InboundMessage>(value) {
            Ok(message) => {
                self.dispatch(message).await;
                Ok(())
            }
            Err(_) if !InboundMessage::ACTIONS.contains(&action.as_str()) => {
                tracing::warn!(action = %action, "Dropping message with unknown action");
                Ok(())
            }
            Err(e) => Err(Error::Serialization(format!("Invalid {} message: {}", action, e))),
        }
    }

    pub async fn dispatch(&self, message: InboundMessage) {
        let action = message.action();
        tracing::debug!(action, "Handling control plane message");
        if let Err(e) = self.handle(message).await {
            tracing::error!(action, error = %e, "Failed to handle control plane message");
        }
    }

    async fn handle(&self, message: InboundMessage) -> Result<()> {
        match message {
            InboundMessage::HeartbeatAck(response) => {
                self.reconciler.reconcile(&response).await;
            }
            InboundMessage::ProcessReady(ready) => {
                let id: ProcessId = ready.process_id.parse()?;
                self.registry
                    .mark_ready(&id, ready.log_paths.unwrap_or_default())?;
            }
            InboundMessage::GameSessionActivated(activated) => {
                let id: ProcessId = activated.process_id.parse()?;
                self.registry
                    .activate_game_session(&id, activated.game_session_id)?;
            }
            InboundMessage::ForceExitProcess(exit) => {
                let id: ProcessId = exit.process_id.parse()?;
                let reason =
                    ProcessTerminationReason::from_reason(exit.termination_reason.as_deref());
                self.terminator.terminate_process(id, reason).await?;
            }
            InboundMessage::StartTermination(_) => {
                let deadline = Utc::now()
                    + chrono::Duration::from_std(DEFAULT_TERMINATION_DELAY)
                        .unwrap_or_else(|_| chrono::Duration::minutes(5));
                self.termination.request_termination(deadline, false);
            }
            InboundMessage::RefreshConnection(_) => {
                tracing::debug!("Connection refresh is handled by the transport");
            }
        }
        Ok(())
    }
}
