/*!
 # Fleet Agent

 A host-resident agent that runs game server processes for a managed fleet.

 ## Overview

 The agent:
 - Launches the server processes described by a runtime configuration
 - Supervises them and relaunches the ones that exit
 - Kills whole process trees, so nothing a server spawned outlives it
 - Reports compute and process state to the control plane on every heartbeat
 - Reconciles local state with the control plane's answer
 - Drains and terminates the compute when asked to

 The connection to the control plane is supplied by the embedding binary
 through [`transport::ControlPlaneClient`]; pushed messages are handed to
 [`FleetAgent::handle_message`].

 ## Basic Usage

 ```no_run
 use fleet_agent::compute::NoInterruptions;
 use fleet_agent::config::{AgentConfig, RuntimeConfiguration};
 use fleet_agent::transport::ControlPlaneClient;
 use fleet_agent::{FleetAgent, Result};
 use std::sync::Arc;

 async fn run(client: Arc<dyn ControlPlaneClient>) -> Result<()> {
     let agent_config = AgentConfig::from_file("agent.json")?;
     fleet_agent::logging::init(&agent_config.logging);
     let runtime = RuntimeConfiguration::from_file("runtime.json")?;

     let mut agent = FleetAgent::new(agent_config, runtime, client, Arc::new(NoInterruptions))?;
     agent.start().await?;

     // Messages pushed by the control plane:
     agent.handle_message(r#"{"Action":"StartTermination"}"#).await;

     agent.wait_terminated().await;
     agent.stop();
     Ok(())
 }
 ```
*/

pub mod compute;
pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod reconcile;
pub mod retry;
pub mod schedule;
pub mod transport;

pub use compute::{ComputeStatus, ComputeTerminationHandler};
pub use config::{AgentConfig, RuntimeConfiguration};
pub use error::{Error, Result};
pub use process::{ProcessId, ProcessTerminationReason};

use chrono::{DateTime, Utc};
use compute::{ComputeStateMachine, ComputeTerminator, InterruptionMonitor, InterruptionSource};
use process::{ProcessManager, ProcessPlatform, ProcessRegistry, ProcessTerminator};
use reconcile::{HeartbeatReconciler, HeartbeatSender};
use schedule::PeriodicTask;
use std::sync::Arc;
use transport::{ControlPlaneClient, MessageDispatcher};

/// Runs the agent: owns every component and the periodic tasks.
///
/// All public methods are instrumented with `tracing` spans.
pub struct FleetAgent {
    config: AgentConfig,
    state: Arc<ComputeStateMachine>,
    manager: Arc<ProcessManager>,
    terminator: Arc<ComputeTerminator>,
    heartbeat: Arc<HeartbeatSender>,
    interruption: Arc<InterruptionMonitor>,
    dispatcher: MessageDispatcher,
    tasks: Vec<PeriodicTask>,
}

impl FleetAgent {
    /// Creates an agent for the host OS.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigInvalid`] when either configuration fails validation.
    #[tracing::instrument(skip_all, fields(configurations = runtime.server_processes.len()))]
    pub fn new(
        config: AgentConfig,
        runtime: RuntimeConfiguration,
        client: Arc<dyn ControlPlaneClient>,
        interruptions: Arc<dyn InterruptionSource>,
    ) -> Result<Self> {
        let platform = ProcessPlatform::detect(&config);
        Self::with_platform(config, runtime, platform, client, interruptions)
    }

    /// Creates an agent with explicit process launch/destroy strategies.
    #[tracing::instrument(skip_all, fields(os = ?platform.os))]
    pub fn with_platform(
        config: AgentConfig,
        runtime: RuntimeConfiguration,
        platform: ProcessPlatform,
        client: Arc<dyn ControlPlaneClient>,
        interruptions: Arc<dyn InterruptionSource>,
    ) -> Result<Self> {
        crate::config::validate_agent_config(&config)?;
        crate::config::validate_runtime_configuration(&runtime)?;

        let state = Arc::new(ComputeStateMachine::new());
        let registry = ProcessRegistry::new(Arc::clone(&state));
        let manager = Arc::new(ProcessManager::new(
            &config,
            runtime,
            &platform,
            registry.clone(),
            Arc::clone(&client),
        ));
        let terminator = Arc::new(ComputeTerminator::new(
            Arc::clone(&state),
            Arc::clone(&manager),
            config.termination_poll_interval(),
        ));
        let process_terminator: Arc<dyn ProcessTerminator> = manager.clone();
        let termination: Arc<dyn ComputeTerminationHandler> = terminator.clone();

        let reconciler = Arc::new(HeartbeatReconciler::new(
            Arc::clone(&state),
            Arc::clone(&process_terminator),
            Arc::clone(&termination),
        ));
        let heartbeat = Arc::new(HeartbeatSender::new(
            client,
            Arc::clone(&state),
            registry.clone(),
            Arc::clone(&reconciler),
            config.retry.policy(),
            config.retry.max_retries,
        ));
        let interruption = Arc::new(InterruptionMonitor::new(
            interruptions,
            Arc::clone(&state),
            Arc::clone(&termination),
        ));
        let dispatcher = MessageDispatcher::new(registry, process_terminator, termination, reconciler);

        tracing::info!("Fleet agent created");
        Ok(Self {
            config,
            state,
            manager,
            terminator,
            heartbeat,
            interruption,
            dispatcher,
            tasks: Vec::new(),
        })
    }

    /// Launches every configured process and starts the supervision,
    /// heartbeat and interruption tasks.
    ///
    /// # Errors
    ///
    /// [`Error::ComputeShuttingDown`] when compute is already terminating.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<Vec<ProcessId>> {
        if self.state.is_terminating_or_terminated() {
            return Err(Error::ComputeShuttingDown);
        }
        if !self.tasks.is_empty() {
            tracing::warn!("Agent already started");
            return Ok(self.manager.registry().ids());
        }

        let launched = self.manager.launch_all().await;

        let manager = Arc::clone(&self.manager);
        self.tasks.push(PeriodicTask::spawn(
            "process-supervision",
            self.config.process_supervision_interval(),
            move || {
                let manager = Arc::clone(&manager);
                async move { manager.supervise().await }
            },
        ));

        let heartbeat = Arc::clone(&self.heartbeat);
        self.tasks.push(PeriodicTask::spawn(
            "heartbeat",
            self.config.heartbeat_interval(),
            move || {
                let heartbeat = Arc::clone(&heartbeat);
                async move { heartbeat.send_once().await }
            },
        ));

        let interruption = Arc::clone(&self.interruption);
        self.tasks.push(PeriodicTask::spawn(
            "interruption-monitor",
            self.config.interruption_poll_interval(),
            move || {
                let interruption = Arc::clone(&interruption);
                async move { interruption.check().await.map(|_| ()) }
            },
        ));

        tracing::info!(processes = launched.len(), "Fleet agent started");
        Ok(launched)
    }

    /// Handles one message pushed by the control plane.
    ///
    /// Failures are logged.
    #[tracing::instrument(skip(self, raw))]
    pub async fn handle_message(&self, raw: &str) {
        if let Err(e) = self.dispatcher.dispatch_json(raw).await {
            tracing::warn!(error = %e, "Dropping unreadable control plane message");
        }
    }

    /// Sends one heartbeat now and reconciles the response.
    #[tracing::instrument(skip(self))]
    pub async fn send_heartbeat(&self) -> Result<()> {
        self.heartbeat.send_once().await
    }

    #[tracing::instrument(skip(self))]
    pub fn request_termination(&self, deadline: DateTime<Utc>, is_spot_interruption: bool) {
        self.terminator
            .request_termination(deadline, is_spot_interruption);
    }

    #[tracing::instrument(skip(self))]
    pub fn complete_termination_now(&self) {
        self.terminator.complete_termination_now();
    }

    pub fn is_compute_terminating_or_terminated(&self) -> bool {
        self.state.is_terminating_or_terminated()
    }

    pub fn current_compute_status(&self) -> ComputeStatus {
        self.state.status()
    }

    pub fn process_ids(&self) -> Vec<ProcessId> {
        self.manager.registry().ids()
    }

    pub async fn wait_terminated(&self) {
        self.terminator.wait_terminated().await;
    }

    /// Stops the periodic tasks. Running processes are left alone.
    #[tracing::instrument(skip(self))]
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.stop();
        }
        tracing::info!("Fleet agent stopped");
    }
}
