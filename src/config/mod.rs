//! Configuration module for the fleet agent.
//!
//! Two documents configure the agent:
//!
//! - [`RuntimeConfiguration`]: which server processes to run and how many of
//!   each. It is fetched once at startup and treated as a value afterwards.
//! - [`AgentConfig`]: agent-local settings such as task intervals, retry
//!   tuning and logging.
//!
//! Both are JSON with camelCase keys; unknown keys are ignored.
//!
//! # Examples
//!
//! Loading a runtime configuration from a string:
//!
//! ```
//! use fleet_agent::config::RuntimeConfiguration;
//!
//! let config = RuntimeConfiguration::parse_from_str(r#"{
//!     "serverProcesses": [
//!         { "launchPath": "/local/game/server", "parameters": "-port 7777", "concurrentExecutions": 2 }
//!     ]
//! }"#).unwrap();
//! assert_eq!(config.total_processes(), 2);
//! assert_eq!(config.server_processes[0].parameters(), ["-port", "7777"]);
//! ```
//!
//! Building one programmatically:
//!
//! ```
//! use fleet_agent::config::{GameProcessConfiguration, RuntimeConfiguration};
//!
//! let config = RuntimeConfiguration::new(vec![
//!     GameProcessConfiguration::new("/local/game/server").with_parameters("-log"),
//! ]);
//! assert_eq!(config.server_processes[0].concurrent_executions(), 1);
//! ```
mod agent;
mod parser;
pub mod validator;

pub use agent::{AgentConfig, LoggingConfig, RetryConfig};
pub use parser::{GameProcessConfiguration, RuntimeConfiguration};
pub use validator::{validate_agent_config, validate_runtime_configuration};
