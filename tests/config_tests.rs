use assert_fs::prelude::*;
use fleet_agent::config::{
    AgentConfig, GameProcessConfiguration, RuntimeConfiguration, validate_agent_config,
    validate_runtime_configuration,
};
use fleet_agent::error::{Error, Result};
use std::time::Duration;

#[test]
fn test_parse_runtime_configuration() -> Result<()> {
    let config_str = r#"{
        "gameSessionActivationTimeoutSeconds": 300,
        "maxConcurrentGameSessionActivations": 2,
        "serverProcesses": [
            {
                "launchPath": "/local/game/server",
                "parameters": "-port 7777 -log",
                "concurrentExecutions": 3
            },
            {
                "launchPath": "/local/game/lobby"
            }
        ]
    }"#;

    let config = RuntimeConfiguration::parse_from_str(config_str)?;

    assert_eq!(config.game_session_activation_timeout_seconds, Some(300));
    assert_eq!(config.max_concurrent_game_session_activations, Some(2));
    assert_eq!(config.server_processes.len(), 2);
    assert_eq!(config.total_processes(), 4);

    let server = &config.server_processes[0];
    assert_eq!(server.launch_path, "/local/game/server");
    assert_eq!(server.parameters(), ["-port", "7777", "-log"]);
    assert_eq!(server.concurrent_executions(), 3);

    let lobby = &config.server_processes[1];
    assert!(lobby.parameters().is_empty());
    assert_eq!(lobby.concurrent_executions(), 1);

    Ok(())
}

#[test]
fn test_runtime_configuration_from_file() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("runtime.json");
    file.write_str(r#"{ "serverProcesses": [ { "launchPath": "server.sh", "parameters": "a b" } ] }"#)
        .unwrap();

    let config = RuntimeConfiguration::from_file(file.path())?;
    assert_eq!(config.server_processes[0].parameters(), ["a", "b"]);
    Ok(())
}

#[test]
fn test_missing_file_is_parse_error() {
    let err = RuntimeConfiguration::from_file("/no/such/runtime.json").unwrap_err();
    assert!(matches!(err, Error::ConfigParse(_)));
}

#[test]
fn test_validate_runtime_configuration() {
    let valid = RuntimeConfiguration::new(vec![GameProcessConfiguration::new("/local/game/server")]);
    assert!(validate_runtime_configuration(&valid).is_ok());

    let empty = RuntimeConfiguration::new(vec![]);
    assert!(matches!(
        validate_runtime_configuration(&empty),
        Err(Error::ConfigInvalid(_))
    ));

    let blank_path = RuntimeConfiguration::new(vec![GameProcessConfiguration::new("  ")]);
    assert!(validate_runtime_configuration(&blank_path).is_err());

    let zero = RuntimeConfiguration::new(vec![
        GameProcessConfiguration::new("/local/game/server").with_concurrent_executions(0),
    ]);
    assert!(validate_runtime_configuration(&zero).is_err());
}

#[test]
fn test_agent_config_defaults() -> Result<()> {
    let config = AgentConfig::parse_from_str("{}")?;
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(60));
    assert_eq!(config.termination_poll_interval(), Duration::from_millis(1000));
    assert_eq!(config.logging.level, "info");
    assert!(config.launch_path_prefix.is_none());
    validate_agent_config(&config)?;
    Ok(())
}

#[test]
fn test_agent_config_from_file() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("agent.json");
    file.write_str(
        r#"{
            "heartbeatIntervalSeconds": 10,
            "launchPathPrefix": "/opt/game",
            "environment": { "REGION": "eu-west-1" },
            "retry": { "maxRetries": 2, "backoffFactorMillis": 50 },
            "logging": { "level": "debug", "json": true }
        }"#,
    )
    .unwrap();

    let config = AgentConfig::from_file(file.path())?;
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
    assert_eq!(config.launch_path_prefix.as_deref(), Some("/opt/game"));
    assert_eq!(config.environment.get("REGION").map(String::as_str), Some("eu-west-1"));
    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.retry.policy().backoff_factor, Duration::from_millis(50));
    assert!(config.logging.json);
    Ok(())
}

#[test]
fn test_zero_interval_is_invalid() {
    let config = AgentConfig {
        heartbeat_interval_seconds: 0,
        ..AgentConfig::default()
    };
    assert!(matches!(validate_agent_config(&config), Err(Error::ConfigInvalid(_))));
}
