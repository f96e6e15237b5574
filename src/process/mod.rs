//! Process management module for the fleet agent.
//!
//! This module launches game server processes, keeps track of them, and tears
//! down whole process trees when they must go away.
//!
//! # Components
//!
//! * `handle` - capability traits over a running OS process and the process table
//! * `launcher` - per-OS strategies that turn a configuration into a running process
//! * `destroyer` - per-OS strategies that kill a process and all its descendants
//! * `native` - platform-independent helpers for the native adapters
//! * `registry` - every managed process, keyed by its agent-assigned id
//! * `termination` - reasons a process stopped, and their event codes
//! * `manager` - launch, supervision and termination on top of the above
//!
//! The launcher/destroyer pair is chosen once at startup by
//! [`ProcessPlatform::detect`]; nothing above this module dispatches on the OS.
//!
//! # Examples
//!
//! ```no_run
//! use fleet_agent::config::{AgentConfig, GameProcessConfiguration};
//! use fleet_agent::process::ProcessPlatform;
//! use std::collections::HashMap;
//!
//! let platform = ProcessPlatform::detect(&AgentConfig::default());
//! let config = GameProcessConfiguration::new("/local/game/server").with_parameters("-port 7777");
//! let handle = platform.launcher.launch(&config, &HashMap::new()).unwrap();
//!
//! // Kill the server and everything it spawned.
//! platform.destroyer.destroy(handle.as_ref());
//! ```
pub mod destroyer;
pub mod handle;
pub mod launcher;
pub mod manager;
pub mod native;
pub mod registry;
pub mod termination;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use destroyer::{LinuxProcessDestroyer, ProcessDestroyer, WindowsProcessDestroyer};
pub use handle::{ProcessHandle, ProcessTree};
pub use launcher::{OsFamily, ProcessLauncher, ProcessPlatform};
pub use manager::{PROCESS_ID_ENV_VAR, ProcessManager, ProcessTerminator};
pub use registry::{ManagedProcess, ProcessId, ProcessRegistry, ProcessStatus};
pub use termination::ProcessTerminationReason;

#[cfg(unix)]
pub use unix::{LinuxProcessLauncher, ProcfsProcessTree, UnixProcessHandle};
#[cfg(windows)]
pub use windows::{ToolhelpProcessTree, WindowsProcessHandle, WindowsProcessLauncher};
