//! Compute-level state and its shutdown path.
//!
//! * `state` - the compute status and its guarded transitions
//! * `terminator` - drains and stops every process when compute shuts down
//! * `interruption` - watches for external interruption notices
mod interruption;
mod state;
mod terminator;

pub use interruption::{InterruptionMonitor, InterruptionSource, NoInterruptions};
pub use state::{ComputeStateMachine, ComputeStatus};
pub use terminator::{ComputeTerminationHandler, ComputeTerminator, DEFAULT_TERMINATION_DELAY};
