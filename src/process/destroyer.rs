use crate::process::handle::{ProcessHandle, ProcessTree};
use async_process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Kills a process and every process it spawned.
///
/// `destroy` is best-effort. Failures are logged and never returned, so one
/// stuck process cannot stall work on the others. Calls block the current
/// thread; async callers should use `spawn_blocking`.
pub trait ProcessDestroyer: Send + Sync {
    fn destroy(&self, handle: &dyn ProcessHandle);
}

/// How long a killed process group may take to disappear.
const GROUP_EXIT_WAIT: Duration = Duration::from_secs(2);

/// Linux strategy: one `SIGKILL` to the whole process group.
///
/// Launched processes lead their own session, so signalling `-<pgid>` reaches
/// every descendant no matter how deep the tree is. The signal is sent by a
/// `setsid kill -9 -- -<pgid>` helper whose runtime is bounded by `timeout`.
/// When the group is still there afterwards, the descendants seen before the
/// kill and the root are killed one by one.
#[derive(Clone)]
pub struct LinuxProcessDestroyer {
    timeout: Duration,
    tree: Arc<dyn ProcessTree>,
}

impl LinuxProcessDestroyer {
    pub fn new(timeout: Duration, tree: Arc<dyn ProcessTree>) -> Self {
        Self { timeout, tree }
    }

    fn kill_group(&self, pgid: u32) -> crate::Result<()> {
        // Without `--`, procps `kill` reads `-<pgid>` as an option and
        // signals nothing.
        let mut helper = Command::new("setsid")
            .arg("kill")
            .arg("-9")
            .arg("--")
            .arg(format!("-{}", pgid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = helper.try_status()? {
                if !status.success() {
                    tracing::debug!(pgid, ?status, "Kill helper exited unsuccessfully");
                }
                return Ok(());
            }
            if Instant::now() >= deadline {
                let _ = helper.kill();
                return Err(crate::Error::Timeout(format!(
                    "kill helper for process group {} did not finish within {:?}",
                    pgid, self.timeout
                )));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Waits for every member of `pgid` to be gone, reaping the root on the
    /// way.
    fn wait_group_gone(handle: &dyn ProcessHandle, pgid: u32) -> bool {
        let deadline = Instant::now() + GROUP_EXIT_WAIT;
        loop {
            let root_alive = handle.is_alive();
            if !root_alive && !group_exists(pgid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

#[cfg(unix)]
fn group_exists(pgid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    !matches!(killpg(Pid::from_raw(pgid as i32), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn group_exists(_pgid: u32) -> bool {
    false
}

impl std::fmt::Debug for LinuxProcessDestroyer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxProcessDestroyer")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProcessDestroyer for LinuxProcessDestroyer {
    fn destroy(&self, handle: &dyn ProcessHandle) {
        let pid = handle.pid();
        let Some(pgid) = handle.process_group_id() else {
            tracing::warn!(pid, "Process has no group id, killing it alone");
            if let Err(e) = handle.terminate() {
                tracing::error!(pid, error = %e, "Failed to kill process");
            }
            return;
        };

        // Once the root dies its children are reparented out of this view.
        let descendants = self.tree.descendants(pid).unwrap_or_else(|e| {
            tracing::warn!(pid, error = %e, "Failed to enumerate descendants");
            Vec::new()
        });

        tracing::info!(pid, pgid, descendants = descendants.len(), "Killing process group");
        if let Err(e) = self.kill_group(pgid) {
            tracing::error!(pid, pgid, error = %e, "Failed to kill process group");
        }
        if Self::wait_group_gone(handle, pgid) {
            return;
        }

        tracing::error!(pid, pgid, ?descendants, "Process group survived the kill, killing members one by one");
        for child in descendants {
            if let Err(e) = self.tree.terminate(child) {
                tracing::debug!(pid, child, error = %e, "Failed to kill descendant");
            }
        }
        if let Err(e) = handle.terminate() {
            tracing::error!(pid, error = %e, "Failed to kill process");
        }
    }
}

/// Windows strategy: every descendant is killed first, then the root.
///
/// Killing the root last keeps descendants from being reparented out of the
/// snapshot while the tree is being torn down.
#[derive(Clone)]
pub struct WindowsProcessDestroyer {
    tree: Arc<dyn ProcessTree>,
}

impl WindowsProcessDestroyer {
    pub fn new(tree: Arc<dyn ProcessTree>) -> Self {
        Self { tree }
    }
}

impl ProcessDestroyer for WindowsProcessDestroyer {
    fn destroy(&self, handle: &dyn ProcessHandle) {
        let pid = handle.pid();
        let descendants = match self.tree.descendants(pid) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(pid, error = %e, "Failed to enumerate descendants");
                Vec::new()
            }
        };

        tracing::info!(pid, descendants = descendants.len(), "Killing process tree");
        for child in descendants {
            if let Err(e) = self.tree.terminate(child) {
                tracing::warn!(pid, child, error = %e, "Failed to kill descendant");
            }
        }

        if let Err(e) = handle.terminate() {
            tracing::error!(pid, error = %e, "Failed to kill process");
        }
    }
}
