//! Heartbeat-driven reconciliation with the control plane.
//!
//! Every heartbeat response carries the control plane's view of this compute
//! and its processes. [`HeartbeatReconciler`] applies that view: unhealthy
//! processes are killed, processes that never register are killed after
//! [`UNREGISTERED_PROCESS_THRESHOLD`] heartbeats, and the compute status
//! follows the reported one until local termination begins.
mod counter;
mod heartbeat;

pub use counter::{UNREGISTERED_PROCESS_THRESHOLD, UnregisteredProcessCounter};
pub use heartbeat::{HeartbeatReconciler, HeartbeatSender};
