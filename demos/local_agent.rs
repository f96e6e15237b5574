use async_trait::async_trait;
use chrono::Utc;
use fleet_agent::compute::NoInterruptions;
use fleet_agent::config::{AgentConfig, GameProcessConfiguration, RuntimeConfiguration};
use fleet_agent::error::Result;
use fleet_agent::transport::{
    ControlPlaneClient, HeartbeatRequest, HeartbeatResponse, ProcessTerminationNotice,
};
use fleet_agent::FleetAgent;
use std::sync::Arc;
use std::time::Duration;

/// Control plane stand-in that accepts everything and logs what it receives.
struct LoggingControlPlane;

#[async_trait]
impl ControlPlaneClient for LoggingControlPlane {
    async fn send_heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        println!(
            "heartbeat: status={} processes={}",
            request.status,
            request.process_list.len()
        );
        Ok(HeartbeatResponse {
            status: Some("Active".to_string()),
            ..Default::default()
        })
    }

    async fn notify_process_terminated(&self, notice: ProcessTerminationNotice) -> Result<()> {
        println!(
            "process {} terminated: {} ({:?})",
            notice.process_id, notice.termination_reason, notice.event_code
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = AgentConfig::default();
    config.heartbeat_interval_seconds = 2;
    config.process_supervision_interval_seconds = 1;
    config.logging.level = "debug".to_string();
    fleet_agent::logging::init(&config.logging);

    tracing::info!("Starting local_agent demo");

    // Two copies of a long sleep stand in for a game server build.
    let runtime = RuntimeConfiguration::new(vec![
        GameProcessConfiguration::new("/bin/sleep")
            .with_parameters("300")
            .with_concurrent_executions(2),
    ]);

    let mut agent = FleetAgent::new(
        config,
        runtime,
        Arc::new(LoggingControlPlane),
        Arc::new(NoInterruptions),
    )?;

    let launched = agent.start().await?;
    println!("Launched {} processes", launched.len());

    // Simulate the server SDK registering the first process.
    if let Some(id) = launched.first() {
        agent
            .handle_message(&format!(
                r#"{{"Action":"ProcessReady","processId":"{}","logPaths":["/tmp/server.log"]}}"#,
                id
            ))
            .await;
    }

    tokio::time::sleep(Duration::from_secs(5)).await;
    println!("Compute status: {}", agent.current_compute_status());

    println!("Requesting termination with a 3 second deadline...");
    agent.request_termination(Utc::now() + chrono::Duration::seconds(3), false);
    agent.wait_terminated().await;
    println!("Compute status: {}", agent.current_compute_status());

    agent.stop();
    Ok(())
}
