mod support;

use chrono::Utc;
use fleet_agent::compute::NoInterruptions;
use fleet_agent::config::{AgentConfig, GameProcessConfiguration, RuntimeConfiguration};
use fleet_agent::transport::HeartbeatResponse;
use fleet_agent::{ComputeStatus, Error, FleetAgent};
use std::sync::Arc;
use std::time::Duration;
use support::{FakeLauncher, RecordingControlPlane, eventually, fake_platform};

const WAIT: Duration = Duration::from_secs(5);

fn agent(executions: u32) -> (FleetAgent, Arc<FakeLauncher>, Arc<RecordingControlPlane>) {
    let config = AgentConfig {
        heartbeat_interval_seconds: 3600,
        process_supervision_interval_seconds: 3600,
        interruption_poll_interval_seconds: 3600,
        termination_poll_interval_millis: 10,
        ..AgentConfig::default()
    };
    let runtime = RuntimeConfiguration::new(vec![
        GameProcessConfiguration::new("/game/server").with_concurrent_executions(executions),
    ]);
    let (platform, launcher) = fake_platform();
    let client = Arc::new(RecordingControlPlane::default());
    let agent = FleetAgent::with_platform(
        config,
        runtime,
        platform,
        client.clone(),
        Arc::new(NoInterruptions),
    )
    .unwrap();
    (agent, launcher, client)
}

#[tokio::test]
async fn test_start_launches_configured_processes() {
    let (mut agent, launcher, _) = agent(2);

    let launched = agent.start().await.unwrap();

    assert_eq!(launched.len(), 2);
    assert_eq!(launcher.alive().len(), 2);
    assert_eq!(agent.current_compute_status(), ComputeStatus::Initializing);
    agent.stop();
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let (platform, _) = fake_platform();
    let result = FleetAgent::with_platform(
        AgentConfig::default(),
        RuntimeConfiguration::new(vec![]),
        platform,
        Arc::new(RecordingControlPlane::default()),
        Arc::new(NoInterruptions),
    );
    assert!(matches!(result, Err(Error::ConfigInvalid(_))));
}

#[tokio::test]
async fn test_activation_follows_heartbeat_and_ready_process() {
    let (mut agent, _, _) = agent(1);
    let launched = agent.start().await.unwrap();

    agent
        .handle_message(r#"{"Action":"HeartbeatAck","status":"Initializing"}"#)
        .await;
    assert_eq!(agent.current_compute_status(), ComputeStatus::Activating);

    agent
        .handle_message(&format!(
            r#"{{"Action":"ProcessReady","processId":"{}","logPaths":["/game/logs/server.log"]}}"#,
            launched[0]
        ))
        .await;
    assert_eq!(agent.current_compute_status(), ComputeStatus::Active);
    agent.stop();
}

#[tokio::test]
async fn test_force_exit_reports_given_reason() {
    let (mut agent, launcher, client) = agent(1);
    let launched = agent.start().await.unwrap();

    agent
        .handle_message(&format!(
            r#"{{"Action":"ForceExitProcess","processId":"{}","terminationReason":"CustomerInitiated"}}"#,
            launched[0]
        ))
        .await;

    assert!(launcher.alive().is_empty());
    assert!(agent.process_ids().is_empty());
    let notices = client.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].termination_reason, "CustomerInitiated");
    assert_eq!(notices[0].event_code, None);
    agent.stop();
}

#[tokio::test]
async fn test_unknown_and_malformed_messages_are_dropped() {
    let (mut agent, launcher, client) = agent(1);
    agent.start().await.unwrap();

    agent.handle_message(r#"{"Action":"Dance","processId":"x"}"#).await;
    agent.handle_message("this is not json").await;
    agent
        .handle_message(r#"{"Action":"ForceExitProcess","processId":"not-a-uuid"}"#)
        .await;

    assert_eq!(launcher.alive().len(), 1);
    assert!(client.notices().is_empty());
    agent.stop();
}

#[tokio::test]
async fn test_start_termination_drains_then_terminates() {
    let (mut agent, launcher, client) = agent(2);
    agent.start().await.unwrap();

    agent.handle_message(r#"{"Action":"StartTermination"}"#).await;
    assert_eq!(agent.current_compute_status(), ComputeStatus::Terminating);
    assert!(agent.is_compute_terminating_or_terminated());

    // The processes shut down on their own well before the deadline.
    for process in launcher.launched() {
        process.exit(0);
    }
    tokio::time::timeout(WAIT, agent.wait_terminated()).await.unwrap();

    assert_eq!(agent.current_compute_status(), ComputeStatus::Terminated);
    let notices = client.notices();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.termination_reason == "NormalTermination"));
    agent.stop();
}

#[tokio::test]
async fn test_deadline_kills_remaining_processes() {
    let (mut agent, launcher, client) = agent(2);
    agent.start().await.unwrap();

    agent.request_termination(Utc::now() + chrono::Duration::milliseconds(50), true);
    tokio::time::timeout(WAIT, agent.wait_terminated()).await.unwrap();

    assert!(launcher.alive().is_empty());
    let notices = client.notices();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.termination_reason == "ComputeShuttingDown"));
    agent.stop();
}

#[tokio::test]
async fn test_complete_termination_now_skips_the_deadline() {
    let (mut agent, launcher, _) = agent(3);
    agent.start().await.unwrap();

    agent.request_termination(Utc::now() + chrono::Duration::hours(1), false);
    agent.complete_termination_now();

    tokio::time::timeout(WAIT, agent.wait_terminated()).await.unwrap();
    assert!(launcher.alive().is_empty());
    assert!(matches!(agent.start().await, Err(Error::ComputeShuttingDown)));
    agent.stop();
}

#[tokio::test]
async fn test_heartbeat_reported_unhealthy_process_is_killed() {
    let (mut agent, launcher, client) = agent(1);
    let launched = agent.start().await.unwrap();

    agent
        .handle_message(&format!(
            r#"{{"Action":"HeartbeatAck","status":"Active","unhealthyProcesses":["{}"]}}"#,
            launched[0]
        ))
        .await;

    assert!(
        eventually(WAIT, || launcher.alive().is_empty()).await,
        "unhealthy process still running"
    );
    assert_eq!(agent.current_compute_status(), ComputeStatus::Active);
    assert_eq!(
        client.notices()[0].event_code.as_deref(),
        Some("SERVER_PROCESS_TERMINATED_UNHEALTHY")
    );
    agent.stop();
}

#[tokio::test]
async fn test_heartbeat_response_is_reconciled() {
    let (mut agent, _, client) = agent(1);
    agent.start().await.unwrap();
    client.respond_with(HeartbeatResponse {
        status: Some("Active".to_string()),
        ..Default::default()
    });

    // The periodic heartbeat is an hour away, so drive one directly.
    agent.send_heartbeat().await.unwrap();

    let heartbeats = client.heartbeats.lock().unwrap().clone();
    assert_eq!(heartbeats.len(), 1);
    assert_eq!(heartbeats[0].status, ComputeStatus::Initializing);
    assert_eq!(heartbeats[0].process_list, agent.process_ids());
    assert_eq!(agent.current_compute_status(), ComputeStatus::Active);
    agent.stop();
}
