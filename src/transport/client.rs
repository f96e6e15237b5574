use crate::error::Result;
use crate::transport::messages::{HeartbeatRequest, HeartbeatResponse, ProcessTerminationNotice};
use async_trait::async_trait;

/// Request/response side of the control-plane connection.
///
/// Framing, reconnects and request correlation belong to the implementor.
/// Errors should use the retryable variants of [`Error`](crate::Error) for
/// transient failures so the retry policy can tell them apart.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Sends one heartbeat and returns the control plane's answer.
    async fn send_heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse>;

    /// Reports that a managed process has stopped.
    async fn notify_process_terminated(&self, notice: ProcessTerminationNotice) -> Result<()>;
}
