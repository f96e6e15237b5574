//! In-memory process platform and control plane shared by the integration
//! tests.
#![allow(dead_code)]

use async_trait::async_trait;
use fleet_agent::config::GameProcessConfiguration;
use fleet_agent::error::{Error, Result};
use fleet_agent::process::{
    OsFamily, ProcessDestroyer, ProcessHandle, ProcessLauncher, ProcessPlatform,
};
use fleet_agent::transport::{
    ControlPlaneClient, HeartbeatRequest, HeartbeatResponse, ProcessTerminationNotice,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// State of one fake process, shared between its handle and the test.
#[derive(Debug)]
pub struct FakeProcess {
    pub pid: u32,
    pub launch_path: String,
    pub environment: HashMap<String, String>,
    alive: AtomicBool,
    exit_code: AtomicI32,
    killable: bool,
}

impl FakeProcess {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Simulates the process exiting on its own.
    pub fn exit(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn process_id(&self) -> &str {
        &self.environment["GAME_SERVER_PROCESS_ID"]
    }
}

#[derive(Debug)]
struct FakeHandle(Arc<FakeProcess>);

impl ProcessHandle for FakeHandle {
    fn pid(&self) -> u32 {
        self.0.pid
    }

    fn is_alive(&self) -> bool {
        self.0.is_alive()
    }

    fn exit_code(&self) -> Option<i32> {
        (!self.0.is_alive()).then(|| self.0.exit_code.load(Ordering::SeqCst))
    }

    fn terminate(&self) -> Result<()> {
        if !self.0.killable {
            return Err(Error::Process(format!("{} ignores kill", self.0.pid)));
        }
        self.0.exit(137);
        Ok(())
    }
}

/// Launcher that records every launch. Paths containing `missing` fail as
/// bad executable paths; paths containing `stubborn` cannot be killed.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    next_pid: AtomicU32,
    launched: Mutex<Vec<Arc<FakeProcess>>>,
}

impl FakeLauncher {
    pub fn launched(&self) -> Vec<Arc<FakeProcess>> {
        self.launched.lock().unwrap().clone()
    }

    pub fn alive(&self) -> Vec<Arc<FakeProcess>> {
        self.launched().into_iter().filter(|p| p.is_alive()).collect()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(
        &self,
        config: &GameProcessConfiguration,
        environment: &HashMap<String, String>,
    ) -> Result<Box<dyn ProcessHandle>> {
        if config.launch_path.contains("missing") {
            return Err(Error::BadExecutablePath(config.launch_path.clone()));
        }
        let process = Arc::new(FakeProcess {
            pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            launch_path: config.launch_path.clone(),
            environment: environment.clone(),
            alive: AtomicBool::new(true),
            exit_code: AtomicI32::new(0),
            killable: !config.launch_path.contains("stubborn"),
        });
        self.launched.lock().unwrap().push(Arc::clone(&process));
        Ok(Box::new(FakeHandle(process)))
    }
}

#[derive(Debug, Default)]
pub struct FakeDestroyer;

impl ProcessDestroyer for FakeDestroyer {
    fn destroy(&self, handle: &dyn ProcessHandle) {
        let _ = handle.terminate();
    }
}

pub fn fake_platform() -> (ProcessPlatform, Arc<FakeLauncher>) {
    let launcher = Arc::new(FakeLauncher::default());
    let platform = ProcessPlatform {
        os: OsFamily::current(),
        launcher: launcher.clone(),
        destroyer: Arc::new(FakeDestroyer),
    };
    (platform, launcher)
}

/// Control plane that records what it is sent.
#[derive(Debug, Default)]
pub struct RecordingControlPlane {
    pub heartbeats: Mutex<Vec<HeartbeatRequest>>,
    pub notices: Mutex<Vec<ProcessTerminationNotice>>,
    pub response: Mutex<HeartbeatResponse>,
}

impl RecordingControlPlane {
    pub fn notices(&self) -> Vec<ProcessTerminationNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn respond_with(&self, response: HeartbeatResponse) {
        *self.response.lock().unwrap() = response;
    }
}

#[async_trait]
impl ControlPlaneClient for RecordingControlPlane {
    async fn send_heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        self.heartbeats.lock().unwrap().push(request);
        Ok(self.response.lock().unwrap().clone())
    }

    async fn notify_process_terminated(&self, notice: ProcessTerminationNotice) -> Result<()> {
        self.notices.lock().unwrap().push(notice);
        Ok(())
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
