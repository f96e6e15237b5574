use crate::config::{AgentConfig, GameProcessConfiguration};
use crate::error::Result;
use crate::process::destroyer::ProcessDestroyer;
use crate::process::handle::ProcessHandle;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Turns a [`GameProcessConfiguration`] into a running process.
pub trait ProcessLauncher: Send + Sync {
    /// Starts one process for `config`.
    ///
    /// The child sees the agent's own environment plus `environment`. Its
    /// standard streams are discarded.
    ///
    /// # Errors
    ///
    /// * [`Error::BadExecutablePath`](crate::Error::BadExecutablePath) when the
    ///   launch path is not an existing executable file
    /// * [`Error::ProcessLaunch`](crate::Error::ProcessLaunch) for any other
    ///   spawn failure
    fn launch(
        &self,
        config: &GameProcessConfiguration,
        environment: &HashMap<String, String>,
    ) -> Result<Box<dyn ProcessHandle>>;
}

/// Operating system family the agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    /// Linux and other Unix-like systems
    Linux,
    /// Windows
    Windows,
}

impl OsFamily {
    /// Family of the running host.
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else {
            OsFamily::Linux
        }
    }

    /// Directory game builds are installed under.
    pub fn default_launch_path_prefix(&self) -> &'static str {
        match self {
            OsFamily::Linux => "/local/game",
            OsFamily::Windows => "C:\\Game",
        }
    }
}

/// The launcher and destroyer for the running OS.
#[derive(Clone)]
pub struct ProcessPlatform {
    /// Detected OS family.
    pub os: OsFamily,
    /// Process launcher for `os`.
    pub launcher: Arc<dyn ProcessLauncher>,
    /// Tree destroyer for `os`.
    pub destroyer: Arc<dyn ProcessDestroyer>,
}

impl ProcessPlatform {
    /// Selects the implementations for the host OS. Called once at startup.
    #[cfg(unix)]
    pub fn detect(config: &AgentConfig) -> Self {
        use crate::process::destroyer::LinuxProcessDestroyer;
        use crate::process::unix::{LinuxProcessLauncher, ProcfsProcessTree};

        let os = OsFamily::current();
        let prefix = launch_path_prefix(config, os);
        tracing::info!(?os, prefix = %prefix.display(), "Selected process platform");
        Self {
            os,
            launcher: Arc::new(LinuxProcessLauncher::new(prefix)),
            destroyer: Arc::new(LinuxProcessDestroyer::new(
                config.destroy_timeout(),
                Arc::new(ProcfsProcessTree),
            )),
        }
    }

    /// Selects the implementations for the host OS. Called once at startup.
    #[cfg(windows)]
    pub fn detect(config: &AgentConfig) -> Self {
        use crate::process::destroyer::WindowsProcessDestroyer;
        use crate::process::windows::{ToolhelpProcessTree, WindowsProcessLauncher};

        let os = OsFamily::current();
        let prefix = launch_path_prefix(config, os);
        tracing::info!(?os, prefix = %prefix.display(), "Selected process platform");
        Self {
            os,
            launcher: Arc::new(WindowsProcessLauncher::new(prefix)),
            destroyer: Arc::new(WindowsProcessDestroyer::new(Arc::new(ToolhelpProcessTree))),
        }
    }
}

fn launch_path_prefix(config: &AgentConfig, os: OsFamily) -> PathBuf {
    config
        .launch_path_prefix
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(os.default_launch_path_prefix()))
}

/// Working directory for launched processes: `prefix` when it is an existing
/// directory, otherwise the agent's own working directory.
pub fn working_directory(prefix: &Path) -> PathBuf {
    if prefix.is_dir() {
        return prefix.to_path_buf();
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Resolves a configured launch path; relative paths are taken relative to
/// the working directory.
pub fn resolve_launch_path(launch_path: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(launch_path.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// Whether `path` is an existing regular file the agent may execute.
#[cfg(unix)]
pub fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Whether `path` is an existing regular file the agent may execute.
#[cfg(not(unix))]
pub fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// Waits up to `grace` for `handle` to exit. Blocks the calling thread.
pub fn wait_for_exit(handle: &dyn ProcessHandle, grace: Duration) -> bool {
    let deadline = std::time::Instant::now() + grace;
    loop {
        if !handle.is_alive() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}
