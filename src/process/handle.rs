use crate::error::Result;
use std::fmt;

/// A running OS process started by a [`ProcessLauncher`](super::ProcessLauncher).
///
/// The handle is owned by exactly one [`ManagedProcess`](super::ManagedProcess).
/// Implementations are internally synchronized so liveness can be polled from
/// any thread.
pub trait ProcessHandle: Send + Sync + fmt::Debug {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Process group id used to signal the whole tree at once, when the
    /// platform has one.
    fn process_group_id(&self) -> Option<u32> {
        None
    }

    /// Whether the process is still running. Reaps the process once it exits.
    fn is_alive(&self) -> bool;

    /// Exit code once the process has exited.
    ///
    /// On Unix a process killed by signal `n` reports `128 + n`.
    fn exit_code(&self) -> Option<i32>;

    /// Forcibly terminates this process only.
    fn terminate(&self) -> Result<()>;
}

/// View of the OS process table.
pub trait ProcessTree: Send + Sync {
    /// Every transitive descendant of `root`, parents before their children.
    /// `root` itself is not included.
    fn descendants(&self, root: u32) -> Result<Vec<u32>>;

    /// Forcibly terminates the process `pid`.
    fn terminate(&self, pid: u32) -> Result<()>;
}
