use crate::config::{AgentConfig, GameProcessConfiguration, RuntimeConfiguration};
use crate::error::{Error, Result};

/// Validates a single server process configuration
pub fn validate_process_configuration(index: usize, config: &GameProcessConfiguration) -> Result<()> {
    if config.launch_path.trim().is_empty() {
        return Err(Error::ConfigInvalid(format!(
            "Server process {} has an empty launchPath",
            index
        )));
    }

    if config.concurrent_executions == Some(0) {
        return Err(Error::ConfigInvalid(format!(
            "Server process {} ('{}') has concurrentExecutions of 0",
            index, config.launch_path
        )));
    }

    // Existence of the executable is checked by the launcher at launch time,
    // where a bad path only fails that one process.

    Ok(())
}

/// Full runtime configuration validation
pub fn validate_runtime_configuration(config: &RuntimeConfiguration) -> Result<()> {
    if config.server_processes.is_empty() {
        return Err(Error::ConfigInvalid("No server processes configured".to_string()));
    }

    for (index, process) in config.server_processes.iter().enumerate() {
        validate_process_configuration(index, process)?;
    }

    if config.max_concurrent_game_session_activations == Some(0) {
        return Err(Error::ConfigInvalid(
            "maxConcurrentGameSessionActivations must be at least 1".to_string(),
        ));
    }

    if config.game_session_activation_timeout_seconds == Some(0) {
        return Err(Error::ConfigInvalid(
            "gameSessionActivationTimeoutSeconds must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Agent settings validation
pub fn validate_agent_config(config: &AgentConfig) -> Result<()> {
    let intervals = [
        ("heartbeatIntervalSeconds", config.heartbeat_interval_seconds),
        (
            "processSupervisionIntervalSeconds",
            config.process_supervision_interval_seconds,
        ),
        (
            "interruptionPollIntervalSeconds",
            config.interruption_poll_interval_seconds,
        ),
        ("destroyTimeoutSeconds", config.destroy_timeout_seconds),
        (
            "terminationPollIntervalMillis",
            config.termination_poll_interval_millis,
        ),
    ];

    for (name, value) in intervals {
        if value == 0 {
            return Err(Error::ConfigInvalid(format!("{} must be positive", name)));
        }
    }

    Ok(())
}
