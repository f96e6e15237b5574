mod support;

use fleet_agent::compute::{ComputeStateMachine, ComputeStatus};
use fleet_agent::config::{AgentConfig, GameProcessConfiguration, RuntimeConfiguration};
use fleet_agent::error::Error;
use fleet_agent::process::{
    PROCESS_ID_ENV_VAR, ProcessId, ProcessManager, ProcessRegistry, ProcessStatus,
    ProcessTerminationReason, ProcessTerminator,
};
use std::sync::Arc;
use std::time::Duration;
use support::{FakeLauncher, RecordingControlPlane, fake_platform};

struct Fixture {
    manager: ProcessManager,
    launcher: Arc<FakeLauncher>,
    client: Arc<RecordingControlPlane>,
    state: Arc<ComputeStateMachine>,
}

fn fixture(configs: Vec<GameProcessConfiguration>) -> Fixture {
    let mut agent_config = AgentConfig::default();
    agent_config.environment.insert("REGION".to_string(), "test-1".to_string());
    let (platform, launcher) = fake_platform();
    let client = Arc::new(RecordingControlPlane::default());
    let state = Arc::new(ComputeStateMachine::with_status(ComputeStatus::Activating));
    let manager = ProcessManager::new(
        &agent_config,
        RuntimeConfiguration::new(configs),
        &platform,
        ProcessRegistry::new(Arc::clone(&state)),
        client.clone(),
    )
    .with_destroy_grace(Duration::from_millis(100));
    Fixture {
        manager,
        launcher,
        client,
        state,
    }
}

#[tokio::test]
async fn test_launch_all_honours_concurrent_executions() {
    let f = fixture(vec![
        GameProcessConfiguration::new("/game/a").with_concurrent_executions(3),
        GameProcessConfiguration::new("/game/b"),
    ]);

    let launched = f.manager.launch_all().await;

    assert_eq!(launched.len(), 4);
    assert_eq!(f.manager.registry().count_for_config(0), 3);
    assert_eq!(f.manager.registry().count_for_config(1), 1);
    for id in &launched {
        let process = f.manager.registry().get(id).unwrap();
        assert_eq!(process.status(), ProcessStatus::Initializing);
    }
}

#[tokio::test]
async fn test_process_id_and_environment_are_injected() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/a")]);

    let id = f.manager.launch(0).await.unwrap();

    let launched = f.launcher.launched();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].environment[PROCESS_ID_ENV_VAR], id.to_string());
    assert_eq!(launched[0].environment["REGION"], "test-1");
}

#[tokio::test]
async fn test_bad_path_is_reported_and_siblings_still_launch() {
    let f = fixture(vec![
        GameProcessConfiguration::new("/game/missing").with_concurrent_executions(2),
        GameProcessConfiguration::new("/game/ok"),
    ]);

    let launched = f.manager.launch_all().await;
    assert_eq!(launched.len(), 1);

    let notices = f.client.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].event_code.as_deref(), Some("SERVER_PROCESS_INVALID_PATH"));

    // A path that failed once is not retried by supervision.
    f.manager.supervise().await.unwrap();
    assert_eq!(f.client.notices().len(), 1);
    assert_eq!(f.manager.registry().len(), 1);
}

#[tokio::test]
async fn test_supervise_reports_exits_and_relaunches() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/a").with_concurrent_executions(2)]);
    f.manager.launch_all().await;

    let launched = f.launcher.launched();
    launched[0].exit(0);
    launched[1].exit(3);
    f.manager.supervise().await.unwrap();

    let mut reasons: Vec<String> = f
        .client
        .notices()
        .into_iter()
        .map(|n| n.termination_reason)
        .collect();
    reasons.sort();
    assert_eq!(reasons, vec!["NormalTermination", "ServerProcessCrashed"]);

    assert_eq!(f.launcher.launched().len(), 4);
    assert_eq!(f.launcher.alive().len(), 2);
    assert_eq!(f.manager.registry().len(), 2);
}

#[tokio::test]
async fn test_no_relaunch_while_terminating() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/a")]);
    f.manager.launch_all().await;
    f.state.transition_to(ComputeStatus::Terminating).unwrap();

    f.launcher.launched()[0].exit(0);
    f.manager.supervise().await.unwrap();

    assert!(f.manager.registry().is_empty());
    assert_eq!(f.launcher.launched().len(), 1);
    assert!(matches!(f.manager.launch(0).await, Err(Error::ComputeShuttingDown)));
}

#[tokio::test]
async fn test_terminate_process_destroys_and_reports_once() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/a")]);
    let id = f.manager.launch(0).await.unwrap();

    f.manager
        .terminate_process(id, ProcessTerminationReason::ServerProcessTerminatedUnhealthy)
        .await
        .unwrap();

    assert!(!f.launcher.launched()[0].is_alive());
    assert!(f.manager.registry().is_empty());

    // Supervision must not report it a second time.
    f.state.transition_to(ComputeStatus::Terminating).unwrap();
    f.manager.supervise().await.unwrap();

    let notices = f.client.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].process_id, id);
    assert_eq!(
        notices[0].event_code.as_deref(),
        Some("SERVER_PROCESS_TERMINATED_UNHEALTHY")
    );
}

#[tokio::test]
async fn test_failed_destroy_leaves_process_registered() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/stubborn")]);
    let id = f.manager.launch(0).await.unwrap();

    let err = f
        .manager
        .terminate_process(id, ProcessTerminationReason::ServerProcessTerminatedUnhealthy)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Process(_)));
    assert!(f.manager.registry().contains(&id));
    assert!(f.client.notices().is_empty());
}

#[tokio::test]
async fn test_unknown_process_termination_is_ignored() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/a")]);
    f.manager
        .terminate_process(ProcessId::new(), ProcessTerminationReason::NormalTermination)
        .await
        .unwrap();
    assert!(f.client.notices().is_empty());
}

#[tokio::test]
async fn test_terminate_all() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/a").with_concurrent_executions(3)]);
    f.manager.launch_all().await;

    f.manager
        .terminate_all(ProcessTerminationReason::ComputeShuttingDown)
        .await;

    assert!(f.manager.registry().is_empty());
    assert!(f.launcher.alive().is_empty());
    let notices = f.client.notices();
    assert_eq!(notices.len(), 3);
    assert!(notices.iter().all(|n| n.event_code.is_none()));
}

#[tokio::test]
async fn test_ready_process_activates_compute() {
    let f = fixture(vec![GameProcessConfiguration::new("/game/a")]);
    let id = f.manager.launch(0).await.unwrap();

    f.manager
        .on_process_ready(&id, vec!["/game/logs".to_string()])
        .unwrap();
    f.manager.on_game_session_activated(&id, "gs-1").unwrap();

    let process = f.manager.registry().get(&id).unwrap();
    assert_eq!(process.status(), ProcessStatus::Active);
    assert_eq!(process.game_session_id().as_deref(), Some("gs-1"));
    assert_eq!(f.state.status(), ComputeStatus::Active);
}
