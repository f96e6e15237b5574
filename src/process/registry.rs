use crate::compute::ComputeStateMachine;
use crate::error::{Error, Result};
use crate::process::handle::ProcessHandle;
use crate::process::termination::ProcessTerminationReason;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Agent-assigned identifier of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::Serialization(format!("Invalid process id '{}': {}", s, e)))
    }
}

/// Status of a managed process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// Launched, not yet registered with the control plane
    Initializing,
    /// Registered through the server SDK
    Active,
}

#[derive(Debug)]
struct ProcessState {
    status: ProcessStatus,
    log_paths: BTreeSet<String>,
    game_session_id: Option<String>,
    pending_termination: Option<ProcessTerminationReason>,
}

/// One server process started by this agent.
///
/// Owns the OS handle exclusively. The mutable part is behind a mutex so the
/// entry can be shared between the registry and in-flight operations.
#[derive(Debug)]
pub struct ManagedProcess {
    id: ProcessId,
    config_index: usize,
    launch_path: String,
    handle: Box<dyn ProcessHandle>,
    state: Mutex<ProcessState>,
}

impl ManagedProcess {
    pub fn new(
        id: ProcessId,
        config_index: usize,
        launch_path: impl Into<String>,
        handle: Box<dyn ProcessHandle>,
    ) -> Self {
        Self {
            id,
            config_index,
            launch_path: launch_path.into(),
            handle,
            state: Mutex::new(ProcessState {
                status: ProcessStatus::Initializing,
                log_paths: BTreeSet::new(),
                game_session_id: None,
                pending_termination: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Index of the configuration in the runtime configuration's process list.
    pub fn config_index(&self) -> usize {
        self.config_index
    }

    pub fn launch_path(&self) -> &str {
        &self.launch_path
    }

    pub fn handle(&self) -> &dyn ProcessHandle {
        self.handle.as_ref()
    }

    pub fn status(&self) -> ProcessStatus {
        self.state().status
    }

    pub fn log_paths(&self) -> Vec<String> {
        self.state().log_paths.iter().cloned().collect()
    }

    pub fn game_session_id(&self) -> Option<String> {
        self.state().game_session_id.clone()
    }

    /// Reason recorded by the first termination request, if any.
    pub fn pending_termination(&self) -> Option<ProcessTerminationReason> {
        self.state().pending_termination
    }

    /// Records why the process is being terminated. The first reason wins.
    pub fn set_pending_termination(&self, reason: ProcessTerminationReason) {
        let mut state = self.state();
        if state.pending_termination.is_none() {
            state.pending_termination = Some(reason);
        }
    }

    fn mark_active<I>(&self, log_paths: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.state();
        state.log_paths.extend(log_paths);
        let changed = state.status != ProcessStatus::Active;
        state.status = ProcessStatus::Active;
        changed
    }
}

/// Every process this agent manages, keyed by [`ProcessId`].
///
/// Safe to use from any task. New entries are refused once compute has begun
/// terminating.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    processes: Arc<DashMap<ProcessId, Arc<ManagedProcess>>>,
    state: Arc<ComputeStateMachine>,
}

impl ProcessRegistry {
    pub fn new(state: Arc<ComputeStateMachine>) -> Self {
        Self {
            processes: Arc::new(DashMap::new()),
            state,
        }
    }

    pub fn compute_state(&self) -> &Arc<ComputeStateMachine> {
        &self.state
    }

    /// Registers a freshly launched process.
    ///
    /// # Errors
    ///
    /// [`Error::ComputeShuttingDown`] once compute is terminating. The caller
    /// still owns `process` and must destroy it.
    ///
    /// The check and the insert are atomic with respect to compute status
    /// changes, so an accepted process is always seen by the termination that
    /// follows.
    pub fn insert(&self, process: &Arc<ManagedProcess>) -> Result<()> {
        self.state
            .unless_terminating(|| {
                self.processes.insert(process.id(), Arc::clone(process));
            })
            .ok_or(Error::ComputeShuttingDown)?;
        tracing::debug!(process_id = %process.id(), pid = process.handle().pid(), "Registered process");
        Ok(())
    }

    pub fn get(&self, id: &ProcessId) -> Option<Arc<ManagedProcess>> {
        self.processes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &ProcessId) -> Option<Arc<ManagedProcess>> {
        self.processes.remove(id).map(|(_, process)| process)
    }

    pub fn contains(&self, id: &ProcessId) -> bool {
        self.processes.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ProcessId> {
        self.processes.iter().map(|entry| *entry.key()).collect()
    }

    pub fn snapshot(&self) -> Vec<Arc<ManagedProcess>> {
        self.processes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Number of registered processes launched from configuration `index`.
    pub fn count_for_config(&self, index: usize) -> usize {
        self.processes
            .iter()
            .filter(|entry| entry.value().config_index() == index)
            .count()
    }

    /// Marks a process as registered with the control plane and attaches its
    /// log paths. Also advances compute from `Activating` to `Active`.
    pub fn mark_ready<I>(&self, id: &ProcessId, log_paths: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let process = self
            .get(id)
            .ok_or_else(|| Error::ProcessNotFound(id.to_string()))?;
        if process.mark_active(log_paths) {
            tracing::info!(process_id = %id, "Process is active");
        }
        self.state.on_process_active();
        Ok(())
    }

    /// Records the game session now hosted by a process.
    pub fn activate_game_session(&self, id: &ProcessId, session_id: impl Into<String>) -> Result<()> {
        let process = self
            .get(id)
            .ok_or_else(|| Error::ProcessNotFound(id.to_string()))?;
        let session_id = session_id.into();
        tracing::info!(process_id = %id, game_session_id = %session_id, "Game session activated");
        process.state().game_session_id = Some(session_id);
        Ok(())
    }
}
