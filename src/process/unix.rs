use crate::config::GameProcessConfiguration;
use crate::error::{Error, Result};
use crate::process::handle::{ProcessHandle, ProcessTree};
use crate::process::launcher::{
    ProcessLauncher, is_executable_file, resolve_launch_path, working_directory,
};
use crate::process::native::descendants_of;
use async_process::{Child, Command, ExitStatus, Stdio};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::sync::Mutex;

struct ChildState {
    child: Child,
    exit: Option<ExitStatus>,
}

/// A process started in its own session, so its pid is also its process
/// group id.
pub struct UnixProcessHandle {
    pid: u32,
    state: Mutex<ChildState>,
}

impl UnixProcessHandle {
    fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            state: Mutex::new(ChildState { child, exit: None }),
        }
    }

    fn poll_exit(&self) -> Option<ExitStatus> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.exit.is_none() {
            match state.child.try_status() {
                Ok(status) => state.exit = status,
                Err(e) => {
                    tracing::warn!(pid = self.pid, error = %e, "Failed to poll process status");
                }
            }
        }
        state.exit
    }
}

impl std::fmt::Debug for UnixProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixProcessHandle").field("pid", &self.pid).finish()
    }
}

impl ProcessHandle for UnixProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn process_group_id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&self) -> bool {
        self.poll_exit().is_none()
    }

    fn exit_code(&self) -> Option<i32> {
        self.poll_exit()
            .map(|status| status.code().or_else(|| status.signal().map(|s| 128 + s)).unwrap_or(-1))
    }

    fn terminate(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.exit.is_some() {
            return Ok(());
        }
        state
            .child
            .kill()
            .map_err(|e| Error::Process(format!("Failed to kill process {}: {}", self.pid, e)))
    }
}

/// Launches processes on Linux and other Unix-like hosts.
///
/// Every child is put in a new session, which makes it the leader of a new
/// process group whose id equals its pid. Standard streams go to `/dev/null`
/// so a chatty child can never block on a full pipe.
#[derive(Debug, Clone)]
pub struct LinuxProcessLauncher {
    launch_path_prefix: PathBuf,
}

impl LinuxProcessLauncher {
    pub fn new(launch_path_prefix: impl Into<PathBuf>) -> Self {
        Self {
            launch_path_prefix: launch_path_prefix.into(),
        }
    }
}

impl ProcessLauncher for LinuxProcessLauncher {
    fn launch(
        &self,
        config: &GameProcessConfiguration,
        environment: &HashMap<String, String>,
    ) -> Result<Box<dyn ProcessHandle>> {
        let working_dir = working_directory(&self.launch_path_prefix);
        let path = resolve_launch_path(&config.launch_path, &working_dir);

        if !is_executable_file(&path) {
            tracing::error!(launch_path = %path.display(), "Launch path is not an executable file");
            return Err(Error::BadExecutablePath(path.display().to_string()));
        }

        let mut std_command = std::process::Command::new(&path);
        std_command
            .args(config.parameters())
            .current_dir(&working_dir)
            .envs(environment);

        // SAFETY: setsid is async-signal-safe and touches no shared state.
        unsafe {
            std_command.pre_exec(|| {
                nix::unistd::setsid().map(|_| ()).map_err(io::Error::from)
            });
        }

        let mut command = Command::from(std_command);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::BadExecutablePath(path.display().to_string()),
            _ => Error::ProcessLaunch(format!("{}: {}", path.display(), e)),
        })?;

        let handle = UnixProcessHandle::new(child);
        tracing::info!(
            pid = handle.pid(),
            launch_path = %path.display(),
            working_dir = %working_dir.display(),
            "Launched server process"
        );
        Ok(Box::new(handle))
    }
}

/// Process table read from `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsProcessTree;

impl ProcfsProcessTree {
    fn snapshot() -> Result<Vec<(u32, u32)>> {
        let mut table = Vec::new();
        for entry in std::fs::read_dir("/proc")? {
            let Ok(entry) = entry else { continue };
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            // Processes may vanish between listing and reading.
            let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some(parent) = parse_parent_pid(&stat) {
                table.push((pid, parent));
            }
        }
        Ok(table)
    }
}

/// Extracts the parent pid from the contents of `/proc/<pid>/stat`.
fn parse_parent_pid(stat: &str) -> Option<u32> {
    // The command name is parenthesized and may itself contain spaces or ')'.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

impl ProcessTree for ProcfsProcessTree {
    fn descendants(&self, root: u32) -> Result<Vec<u32>> {
        Ok(descendants_of(root, &Self::snapshot()?))
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
            .map_err(|e| Error::Process(format!("Failed to kill process {}: {}", pid, e)))
    }
}
