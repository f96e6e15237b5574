use crate::config::GameProcessConfiguration;
use crate::error::{Error, Result};
use crate::process::handle::{ProcessHandle, ProcessTree};
use crate::process::launcher::{ProcessLauncher, resolve_launch_path, working_directory};
use crate::process::native::{
    descendants_of, environment_block, merge_environment, windows_command_line,
};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND, GetLastError, HANDLE,
    INVALID_HANDLE_VALUE, STILL_ACTIVE,
};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
    TH32CS_SNAPPROCESS,
};
use windows_sys::Win32::System::Threading::{
    CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW, CREATE_UNICODE_ENVIRONMENT, CreateProcessW,
    GetExitCodeProcess, OpenProcess, PROCESS_INFORMATION, PROCESS_TERMINATE,
    STARTF_USESTDHANDLES, STARTUPINFOW, TerminateProcess,
};

/// Exit code given to processes killed by the agent.
const FORCED_EXIT_CODE: u32 = 1;

/// Native handle closed on drop.
struct OwnedHandle(HANDLE);

// SAFETY: process and thread handles may be used from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_null() && self.0 != INVALID_HANDLE_VALUE {
            // SAFETY: the handle is owned by this value and closed exactly once.
            unsafe {
                CloseHandle(self.0);
            }
        }
    }
}

fn to_wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

/// A process created through `CreateProcessW`, holding its native process and
/// primary-thread handles.
pub struct WindowsProcessHandle {
    pid: u32,
    process: OwnedHandle,
    _thread: OwnedHandle,
}

impl WindowsProcessHandle {
    fn raw_exit_code(&self) -> Option<u32> {
        let mut code: u32 = 0;
        // SAFETY: `process` is a live handle owned by `self`.
        let ok = unsafe { GetExitCodeProcess(self.process.0, &mut code) };
        if ok == 0 {
            tracing::warn!(pid = self.pid, error = %std::io::Error::last_os_error(), "GetExitCodeProcess failed");
            return None;
        }
        Some(code)
    }
}

impl std::fmt::Debug for WindowsProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsProcessHandle").field("pid", &self.pid).finish()
    }
}

impl ProcessHandle for WindowsProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        matches!(self.raw_exit_code(), Some(code) if code == STILL_ACTIVE as u32)
    }

    fn exit_code(&self) -> Option<i32> {
        match self.raw_exit_code() {
            Some(code) if code != STILL_ACTIVE as u32 => Some(code as i32),
            _ => None,
        }
    }

    fn terminate(&self) -> Result<()> {
        // SAFETY: `process` is a live handle owned by `self`.
        let ok = unsafe { TerminateProcess(self.process.0, FORCED_EXIT_CODE) };
        if ok == 0 {
            return Err(Error::Process(format!(
                "TerminateProcess failed for {}: {}",
                self.pid,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

/// Launches processes on Windows by calling `CreateProcessW` directly, so the
/// native handles stay available for tree enumeration and forced kill.
#[derive(Debug, Clone)]
pub struct WindowsProcessLauncher {
    launch_path_prefix: PathBuf,
}

impl WindowsProcessLauncher {
    pub fn new(launch_path_prefix: impl Into<PathBuf>) -> Self {
        Self {
            launch_path_prefix: launch_path_prefix.into(),
        }
    }

    fn spawn(
        path: &Path,
        args: &[String],
        working_dir: &Path,
        environment: &HashMap<String, String>,
    ) -> Result<WindowsProcessHandle> {
        let application = to_wide(path.as_os_str());
        let mut command_line: Vec<u16> = windows_command_line(&path.to_string_lossy(), args)
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        let parent = std::env::vars_os().map(|(k, v)| {
            (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned())
        });
        let env_block = environment_block(&merge_environment(parent, environment));
        let current_dir = to_wide(working_dir.as_os_str());

        // SAFETY: both structs are plain C data for which all-zero is valid.
        let mut startup: STARTUPINFOW = unsafe { std::mem::zeroed() };
        startup.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
        // Null standard handles: the child's output is discarded.
        startup.dwFlags = STARTF_USESTDHANDLES;
        let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

        // SAFETY: every pointer refers to a live, NUL-terminated buffer owned
        // by this frame, and `info` is written by the call.
        let ok = unsafe {
            CreateProcessW(
                application.as_ptr(),
                command_line.as_mut_ptr(),
                ptr::null(),
                ptr::null(),
                0,
                CREATE_UNICODE_ENVIRONMENT | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW,
                env_block.as_ptr().cast(),
                current_dir.as_ptr(),
                &startup,
                &mut info,
            )
        };

        if ok == 0 {
            // SAFETY: reads the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            return Err(match code {
                ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => {
                    Error::BadExecutablePath(path.display().to_string())
                }
                other => Error::ProcessLaunch(format!(
                    "CreateProcessW failed for {} with error {}",
                    path.display(),
                    other
                )),
            });
        }

        Ok(WindowsProcessHandle {
            pid: info.dwProcessId,
            process: OwnedHandle(info.hProcess),
            _thread: OwnedHandle(info.hThread),
        })
    }
}

impl ProcessLauncher for WindowsProcessLauncher {
    fn launch(
        &self,
        config: &GameProcessConfiguration,
        environment: &HashMap<String, String>,
    ) -> Result<Box<dyn ProcessHandle>> {
        let working_dir = working_directory(&self.launch_path_prefix);
        let path = resolve_launch_path(&config.launch_path, &working_dir);

        let handle = Self::spawn(&path, config.parameters(), &working_dir, environment)
            .inspect_err(|e| {
                tracing::error!(launch_path = %path.display(), error = %e, "CreateProcessW failed");
            })?;

        tracing::info!(
            pid = handle.pid(),
            launch_path = %path.display(),
            working_dir = %working_dir.display(),
            "Launched server process"
        );
        Ok(Box::new(handle))
    }
}

/// Process table read from a Toolhelp snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolhelpProcessTree;

impl ToolhelpProcessTree {
    fn snapshot() -> Result<Vec<(u32, u32)>> {
        // SAFETY: plain FFI call; the returned handle is owned below.
        let raw = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
        if raw == INVALID_HANDLE_VALUE {
            return Err(Error::Process(format!(
                "CreateToolhelp32Snapshot failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let snapshot = OwnedHandle(raw);

        // SAFETY: PROCESSENTRY32W is plain C data.
        let mut entry: PROCESSENTRY32W = unsafe { std::mem::zeroed() };
        entry.dwSize = std::mem::size_of::<PROCESSENTRY32W>() as u32;

        let mut table = Vec::new();
        // SAFETY: `snapshot` is live and `entry.dwSize` is initialised.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) } != 0;
        while more {
            table.push((entry.th32ProcessID, entry.th32ParentProcessID));
            // SAFETY: as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) } != 0;
        }
        Ok(table)
    }
}

impl ProcessTree for ToolhelpProcessTree {
    fn descendants(&self, root: u32) -> Result<Vec<u32>> {
        Ok(descendants_of(root, &Self::snapshot()?))
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        // SAFETY: plain FFI call; the returned handle is owned below.
        let raw = unsafe { OpenProcess(PROCESS_TERMINATE, 0, pid) };
        if raw.is_null() {
            return Err(Error::Process(format!(
                "OpenProcess failed for {}: {}",
                pid,
                std::io::Error::last_os_error()
            )));
        }
        let process = OwnedHandle(raw);

        // SAFETY: `process` was opened with PROCESS_TERMINATE.
        if unsafe { TerminateProcess(process.0, FORCED_EXIT_CODE) } == 0 {
            return Err(Error::Process(format!(
                "TerminateProcess failed for {}: {}",
                pid,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}
