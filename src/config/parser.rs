use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Configuration for one kind of game server process.
///
/// One configuration may back several concurrently running processes, one per
/// [`concurrent_executions`](Self::concurrent_executions).
///
/// # Examples
///
/// ```
/// use fleet_agent::config::GameProcessConfiguration;
///
/// let config = GameProcessConfiguration::new("/local/game/server")
///     .with_parameters("-port 7777  -log")
///     .with_concurrent_executions(3);
///
/// assert_eq!(config.parameters(), ["-port", "7777", "-log"]);
/// assert_eq!(config.concurrent_executions(), 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProcessConfiguration {
    /// Number of processes to keep running for this configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_executions: Option<u32>,

    /// Path of the executable to launch.
    pub launch_path: String,

    /// Whitespace-delimited launch arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,

    #[serde(skip)]
    parsed_parameters: OnceLock<Vec<String>>,
}

impl GameProcessConfiguration {
    /// Creates a configuration with a single execution and no parameters.
    pub fn new(launch_path: impl Into<String>) -> Self {
        Self {
            concurrent_executions: None,
            launch_path: launch_path.into(),
            parameters: None,
            parsed_parameters: OnceLock::new(),
        }
    }

    /// Sets the launch parameters.
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = Some(parameters.into());
        self.parsed_parameters = OnceLock::new();
        self
    }

    /// Sets the number of concurrent executions.
    pub fn with_concurrent_executions(mut self, executions: u32) -> Self {
        self.concurrent_executions = Some(executions);
        self
    }

    /// Effective number of concurrent executions, 1 when unset.
    pub fn concurrent_executions(&self) -> u32 {
        self.concurrent_executions.unwrap_or(1)
    }

    /// Launch arguments in order. Parsed on first use.
    pub fn parameters(&self) -> &[String] {
        self.parsed_parameters.get_or_init(|| {
            self.parameters
                .as_deref()
                .map(|p| p.split_whitespace().map(String::from).collect())
                .unwrap_or_default()
        })
    }
}

/// Runtime configuration describing every server process the agent runs.
///
/// # JSON Schema
///
/// ```json
/// {
///   "gameSessionActivationTimeoutSeconds": 300,
///   "maxConcurrentGameSessionActivations": 2,
///   "serverProcesses": [
///     {
///       "launchPath": "/local/game/server",
///       "parameters": "-port 7777",
///       "concurrentExecutions": 4
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfiguration {
    /// Seconds a process may take to activate a game session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_session_activation_timeout_seconds: Option<u32>,

    /// Maximum number of game sessions that may be activating at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_game_session_activations: Option<u32>,

    /// Server process configurations, in launch order.
    pub server_processes: Vec<GameProcessConfiguration>,
}

impl RuntimeConfiguration {
    /// Creates a runtime configuration with no activation limits.
    pub fn new(server_processes: Vec<GameProcessConfiguration>) -> Self {
        Self {
            game_session_activation_timeout_seconds: None,
            max_concurrent_game_session_activations: None,
            server_processes,
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON
    /// * The JSON does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read runtime configuration: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            Error::ConfigParse(format!("Failed to parse runtime configuration JSON: {}", e))
        })
    }

    /// Total number of processes across all configurations.
    pub fn total_processes(&self) -> u32 {
        self.server_processes
            .iter()
            .map(GameProcessConfiguration::concurrent_executions)
            .sum()
    }
}
