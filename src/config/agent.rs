use crate::error::{Error, Result};
use crate::retry::{DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Retry tuning for control-plane calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub backoff_factor_millis: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor_millis: DEFAULT_BACKOFF_FACTOR.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    /// Builds the retry policy described by this configuration.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.backoff_factor_millis))
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Default filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Agent-local settings.
///
/// Every field has a default, so an empty JSON object is a valid document.
///
/// ```
/// use fleet_agent::config::AgentConfig;
/// use std::time::Duration;
///
/// let config = AgentConfig::parse_from_str(r#"{ "heartbeatIntervalSeconds": 30 }"#).unwrap();
/// assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
/// assert_eq!(config.retry.max_retries, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Seconds between heartbeats.
    pub heartbeat_interval_seconds: u64,
    /// Seconds between process liveness sweeps.
    pub process_supervision_interval_seconds: u64,
    /// Seconds between interruption checks.
    pub interruption_poll_interval_seconds: u64,
    /// Upper bound for a single destroy call.
    pub destroy_timeout_seconds: u64,
    /// Milliseconds between drain checks while terminating.
    pub termination_poll_interval_millis: u64,
    /// Working directory used for launched processes when it exists.
    pub launch_path_prefix: Option<String>,
    /// Extra environment variables for every launched process.
    pub environment: HashMap<String, String>,
    /// Retry tuning.
    pub retry: RetryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 60,
            process_supervision_interval_seconds: 5,
            interruption_poll_interval_seconds: 5,
            destroy_timeout_seconds: 30,
            termination_poll_interval_millis: 1000,
            launch_path_prefix: None,
            environment: HashMap::new(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Loads agent settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read agent config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses agent settings from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse agent config JSON: {}", e)))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn process_supervision_interval(&self) -> Duration {
        Duration::from_secs(self.process_supervision_interval_seconds)
    }

    pub fn interruption_poll_interval(&self) -> Duration {
        Duration::from_secs(self.interruption_poll_interval_seconds)
    }

    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_secs(self.destroy_timeout_seconds)
    }

    pub fn termination_poll_interval(&self) -> Duration {
        Duration::from_millis(self.termination_poll_interval_millis)
    }
}
