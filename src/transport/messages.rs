use crate::compute::ComputeStatus;
use crate::process::{ProcessId, ProcessTerminationReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Periodic status report sent to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    /// Current compute status.
    pub status: ComputeStatus,
    /// Every process id known to this agent.
    pub process_list: Vec<ProcessId>,
    /// When the report was built.
    pub heartbeat_time: DateTime<Utc>,
}

/// The control plane's view, returned for every heartbeat.
///
/// Ids are kept as strings; the reconciler skips ones that do not parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    /// Status the control plane holds for this compute, compared
    /// case-insensitively.
    #[serde(default)]
    pub status: Option<String>,
    /// Processes the control plane considers unhealthy.
    #[serde(default)]
    pub unhealthy_processes: Vec<String>,
    /// Processes that have not registered through the server SDK yet.
    #[serde(default)]
    pub unregistered_processes: Vec<String>,
}

/// Reports that a managed process is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTerminationNotice {
    pub process_id: ProcessId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_code: Option<String>,
    pub termination_reason: String,
}

impl ProcessTerminationNotice {
    pub fn new(process_id: ProcessId, reason: ProcessTerminationReason) -> Self {
        Self {
            process_id,
            event_code: reason.event_code().map(str::to_string),
            termination_reason: reason.as_str().to_string(),
        }
    }
}

/// A server process finished SDK initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReadyMessage {
    pub process_id: String,
    #[serde(default)]
    pub log_paths: Option<Vec<String>>,
}

/// A game session was placed on a server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSessionActivatedMessage {
    pub process_id: String,
    pub game_session_id: String,
}

/// The control plane wants a process gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceExitProcessMessage {
    pub process_id: String,
    #[serde(default)]
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTerminationMessage {}

/// Consumed by the connection layer; the agent only acknowledges it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConnectionMessage {}

/// Messages pushed by the control plane, tagged by their `Action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Action")]
pub enum InboundMessage {
    HeartbeatAck(HeartbeatResponse),
    ProcessReady(ProcessReadyMessage),
    GameSessionActivated(GameSessionActivatedMessage),
    ForceExitProcess(ForceExitProcessMessage),
    StartTermination(StartTerminationMessage),
    RefreshConnection(RefreshConnectionMessage),
}

impl InboundMessage {
    /// Every `Action` value the agent understands.
    pub const ACTIONS: [&'static str; 6] = [
        "HeartbeatAck",
        "ProcessReady",
        "GameSessionActivated",
        "ForceExitProcess",
        "StartTermination",
        "RefreshConnection",
    ];

    pub fn action(&self) -> &'static str {
        match self {
            InboundMessage::HeartbeatAck(_) => "HeartbeatAck",
            InboundMessage::ProcessReady(_) => "ProcessReady",
            InboundMessage::GameSessionActivated(_) => "GameSessionActivated",
            InboundMessage::ForceExitProcess(_) => "ForceExitProcess",
            InboundMessage::StartTermination(_) => "StartTermination",
            InboundMessage::RefreshConnection(_) => "RefreshConnection",
        }
    }
}
