//! Contract with the control-plane connection.
//!
//! The connection itself (WebSocket framing, reconnects, request
//! correlation) lives outside this crate. The agent needs two things from
//! it: a [`ControlPlaneClient`] for requests it sends, and a way to hand
//! pushed messages to the [`MessageDispatcher`].
//!
//! # Wire format
//!
//! Messages are JSON objects with camelCase fields. Pushed messages name
//! their kind in an `Action` field:
//!
//! ```
//! use fleet_agent::transport::InboundMessage;
//!
//! let message: InboundMessage = serde_json::from_str(r#"{
//!     "Action": "GameSessionActivated",
//!     "processId": "0b9f4f5e-6d3c-4c7e-9a53-2f1c0c7e5a11",
//!     "gameSessionId": "gs-1234"
//! }"#).unwrap();
//! assert_eq!(message.action(), "GameSessionActivated");
//! ```
mod client;
mod dispatcher;
mod messages;

pub use client::ControlPlaneClient;
pub use dispatcher::MessageDispatcher;
pub use messages::{
    ForceExitProcessMessage, GameSessionActivatedMessage, HeartbeatRequest, HeartbeatResponse,
    InboundMessage, ProcessReadyMessage, ProcessTerminationNotice, RefreshConnectionMessage,
    StartTerminationMessage,
};
