use crate::config::{AgentConfig, RuntimeConfiguration};
use crate::error::{Error, Result};
use crate::process::destroyer::ProcessDestroyer;
use crate::process::launcher::{ProcessLauncher, ProcessPlatform, wait_for_exit};
use crate::process::registry::{ManagedProcess, ProcessId, ProcessRegistry};
use crate::process::termination::ProcessTerminationReason;
use crate::retry::RetryPolicy;
use crate::transport::{ControlPlaneClient, ProcessTerminationNotice};
use async_trait::async_trait;
use dashmap::DashSet;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Environment variable carrying the agent-assigned process id into each
/// launched server process.
pub const PROCESS_ID_ENV_VAR: &str = "GAME_SERVER_PROCESS_ID";

/// How long a destroyed process gets to be reaped before it counts as a
/// failed destroy.
const DESTROY_GRACE: Duration = Duration::from_secs(5);

/// Terminates a single managed process.
#[async_trait]
pub trait ProcessTerminator: Send + Sync {
    /// Kills the process tree of `id`, reporting `reason` once it is gone.
    ///
    /// Unknown ids are ignored. A failed kill leaves the process registered
    /// so a later call can try again.
    async fn terminate_process(
        &self,
        id: ProcessId,
        reason: ProcessTerminationReason,
    ) -> Result<()>;
}

/// Launches, supervises and terminates the server processes described by
/// the runtime configuration.
///
/// # Examples
///
/// ```no_run
/// use fleet_agent::config::{AgentConfig, GameProcessConfiguration, RuntimeConfiguration};
/// use fleet_agent::compute::ComputeStateMachine;
/// use fleet_agent::process::{ProcessManager, ProcessPlatform, ProcessRegistry};
/// use fleet_agent::transport::ControlPlaneClient;
/// use std::sync::Arc;
///
/// # async fn run(client: Arc<dyn ControlPlaneClient>) {
/// let agent_config = AgentConfig::default();
/// let runtime = RuntimeConfiguration::new(vec![
///     GameProcessConfiguration::new("/local/game/server").with_concurrent_executions(2),
/// ]);
/// let registry = ProcessRegistry::new(Arc::new(ComputeStateMachine::new()));
/// let manager = ProcessManager::new(
///     &agent_config,
///     runtime,
///     &ProcessPlatform::detect(&agent_config),
///     registry,
///     client,
/// );
///
/// let launched = manager.launch_all().await;
/// println!("launched {} processes", launched.len());
/// # }
/// ```
pub struct ProcessManager {
    runtime: Arc<RuntimeConfiguration>,
    launcher: Arc<dyn ProcessLauncher>,
    destroyer: Arc<dyn ProcessDestroyer>,
    registry: ProcessRegistry,
    client: Arc<dyn ControlPlaneClient>,
    retry: RetryPolicy,
    max_retries: u32,
    environment: HashMap<String, String>,
    destroy_grace: Duration,
    invalid_configs: DashSet<usize>,
}

impl ProcessManager {
    pub fn new(
        agent_config: &AgentConfig,
        runtime: RuntimeConfiguration,
        platform: &ProcessPlatform,
        registry: ProcessRegistry,
        client: Arc<dyn ControlPlaneClient>,
    ) -> Self {
        Self {
            runtime: Arc::new(runtime),
            launcher: Arc::clone(&platform.launcher),
            destroyer: Arc::clone(&platform.destroyer),
            registry,
            client,
            retry: agent_config.retry.policy(),
            max_retries: agent_config.retry.max_retries,
            environment: agent_config.environment.clone(),
            destroy_grace: DESTROY_GRACE,
            invalid_configs: DashSet::new(),
        }
    }

    /// Overrides how long a destroyed process may take to be reaped.
    pub fn with_destroy_grace(mut self, grace: Duration) -> Self {
        self.destroy_grace = grace;
        self
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn runtime_configuration(&self) -> &RuntimeConfiguration {
        &self.runtime
    }

    /// Launches `concurrentExecutions` processes for every configuration.
    ///
    /// Failures are logged; one bad configuration never stops the others.
    pub async fn launch_all(&self) -> Vec<ProcessId> {
        let mut launched = Vec::new();
        for (index, config) in self.runtime.server_processes.iter().enumerate() {
            for _ in 0..config.concurrent_executions() {
                match self.launch(index).await {
                    Ok(id) => launched.push(id),
                    Err(Error::ComputeShuttingDown) => return launched,
                    Err(e) => {
                        tracing::error!(config_index = index, launch_path = %config.launch_path, error = %e, "Failed to launch server process");
                        if matches!(e, Error::BadExecutablePath(_)) {
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!(count = launched.len(), "Launched server processes");
        launched
    }

    /// Launches one process for configuration `config_index`.
    ///
    /// # Errors
    ///
    /// * [`Error::ComputeShuttingDown`] once compute is terminating
    /// * [`Error::BadExecutablePath`] when the launch path is unusable; the
    ///   control plane is told with `ServerProcessInvalidPath`
    /// * [`Error::ProcessLaunch`] for other spawn failures
    pub async fn launch(&self, config_index: usize) -> Result<ProcessId> {
        if self.registry.compute_state().is_terminating_or_terminated() {
            return Err(Error::ComputeShuttingDown);
        }
        let config = self
            .runtime
            .server_processes
            .get(config_index)
            .ok_or_else(|| Error::Other(format!("No server process configuration at index {}", config_index)))?;

        let id = ProcessId::new();
        let mut environment = self.environment.clone();
        environment.insert(PROCESS_ID_ENV_VAR.to_string(), id.to_string());

        let handle = match self.launcher.launch(config, &environment) {
            Ok(handle) => handle,
            Err(e @ Error::BadExecutablePath(_)) => {
                self.invalid_configs.insert(config_index);
                self.notify_terminated(id, ProcessTerminationReason::ServerProcessInvalidPath)
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let process = Arc::new(ManagedProcess::new(id, config_index, config.launch_path.clone(), handle));
        if let Err(e) = self.registry.insert(&process) {
            tracing::warn!(process_id = %id, "Compute is shutting down, killing process that was just launched");
            self.destroy(Arc::clone(&process)).await;
            return Err(e);
        }

        tracing::info!(process_id = %id, pid = process.handle().pid(), config_index, "Server process registered");
        Ok(id)
    }

    /// One supervision pass.
    ///
    /// Exited processes are removed and reported. While compute is not
    /// terminating, each configuration is topped back up to its
    /// `concurrentExecutions`.
    pub async fn supervise(&self) -> Result<()> {
        self.reap_exited().await;
        if self.registry.compute_state().is_terminating_or_terminated() {
            return Ok(());
        }
        self.replenish().await;
        Ok(())
    }

    async fn reap_exited(&self) {
        for process in self.registry.snapshot() {
            if process.handle().is_alive() {
                continue;
            }
            if self.registry.remove(&process.id()).is_none() {
                continue;
            }
            let exit_code = process.handle().exit_code();
            let reason = process.pending_termination().unwrap_or(match exit_code {
                Some(0) => ProcessTerminationReason::NormalTermination,
                _ => ProcessTerminationReason::ServerProcessCrashed,
            });
            tracing::info!(process_id = %process.id(), ?exit_code, %reason, "Server process exited");
            self.notify_terminated(process.id(), reason).await;
        }
    }

    async fn replenish(&self) {
        for (index, config) in self.runtime.server_processes.iter().enumerate() {
            if self.invalid_configs.contains(&index) {
                continue;
            }
            let wanted = config.concurrent_executions() as usize;
            let running = self.registry.count_for_config(index);
            for _ in running..wanted {
                match self.launch(index).await {
                    Ok(id) => tracing::info!(process_id = %id, config_index = index, "Relaunched server process"),
                    Err(Error::ComputeShuttingDown) => return,
                    Err(e) => {
                        tracing::error!(config_index = index, error = %e, "Failed to relaunch server process");
                        break;
                    }
                }
            }
        }
    }

    /// Terminates every registered process with `reason`.
    pub async fn terminate_all(&self, reason: ProcessTerminationReason) {
        let ids = self.registry.ids();
        if ids.is_empty() {
            return;
        }
        tracing::info!(count = ids.len(), %reason, "Terminating all server processes");
        let results = join_all(ids.into_iter().map(|id| self.terminate_process(id, reason))).await;
        for result in results {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to terminate server process");
            }
        }
    }

    /// Records that a process registered with the control plane.
    pub fn on_process_ready(&self, id: &ProcessId, log_paths: Vec<String>) -> Result<()> {
        self.registry.mark_ready(id, log_paths)
    }

    pub fn on_game_session_activated(&self, id: &ProcessId, session_id: &str) -> Result<()> {
        self.registry.activate_game_session(id, session_id)
    }

    /// Runs the destroyer off the async workers and waits for the process to
    /// be reaped. Returns whether it exited.
    async fn destroy(&self, process: Arc<ManagedProcess>) -> bool {
        let destroyer = Arc::clone(&self.destroyer);
        let grace = self.destroy_grace;
        let pid = process.handle().pid();
        let span = tracing::info_span!("destroy", process_id = %process.id(), pid);
        let joined = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            destroyer.destroy(process.handle());
            wait_for_exit(process.handle(), grace)
        })
        .await;

        match joined {
            Ok(exited) => exited,
            Err(e) => {
                tracing::error!(pid, error = %e, "Destroy task failed");
                false
            }
        }
    }

    async fn notify_terminated(&self, id: ProcessId, reason: ProcessTerminationReason) {
        let notice = ProcessTerminationNotice::new(id, reason);
        let client = &self.client;
        let result = self
            .retry
            .run_retryable(self.max_retries, true, move || {
                client.notify_process_terminated(notice.clone())
            })
            .instrument(tracing::debug_span!("notify_terminated", process_id = %id))
            .await;
        if let Err(e) = result {
            tracing::error!(process_id = %id, %reason, error = %e, "Failed to report process termination");
        }
    }
}

#[async_trait]
impl ProcessTerminator for ProcessManager {
    async fn terminate_process(&self, id: ProcessId, reason: ProcessTerminationReason) -> Result<()> {
        let Some(process) = self.registry.get(&id) else {
            tracing::warn!(process_id = %id, %reason, "Termination requested for unknown process");
            return Ok(());
        };

        process.set_pending_termination(reason);
        tracing::info!(process_id = %id, pid = process.handle().pid(), %reason, "Terminating server process");

        if !self.destroy(Arc::clone(&process)).await {
            return Err(Error::Process(format!(
                "process {} (pid {}) still running after destroy",
                id,
                process.handle().pid()
            )));
        }

        // Supervision may have reaped it first and already reported it.
        if self.registry.remove(&id).is_some() {
            let reason = process.pending_termination().unwrap_or(reason);
            self.notify_terminated(id, reason).await;
        }
        Ok(())
    }
}
