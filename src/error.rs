//! Error handling module for the fleet agent.
//!
//! Every error the agent can produce is a variant of [`Error`]. Variants are
//! grouped into a small taxonomy that the retry policy consults through
//! [`Error::retryable`]:
//!
//! - transient failures that are worth retrying (`Some(true)`),
//! - permanent failures that must surface immediately (`Some(false)`),
//! - everything the taxonomy does not model (`None`), which the retry policy
//!   treats as retryable.
//!
//! # Example
//!
//! ```
//! use fleet_agent::error::{Error, Result};
//!
//! fn handle_error(result: Result<()>) {
//!     match result {
//!         Ok(_) => println!("Operation succeeded"),
//!         Err(Error::BadExecutablePath(path)) => println!("Cannot launch '{}'", path),
//!         Err(e) if e.retryable() == Some(true) => println!("Transient failure: {}", e),
//!         Err(e) => println!("Other error: {}", e),
//!     }
//! }
//! ```
use thiserror::Error;

/// Errors that can occur in the fleet agent.
#[derive(Error, Debug)]
pub enum Error {
    /// The control plane failed internally. Retryable.
    #[error("Internal service error: {0}")]
    InternalService(String),

    /// The requested entity was not found. Retryable, because the control plane
    /// is eventually consistent and the entity may appear shortly.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The control plane is not ready to serve the request yet. Retryable.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The request was throttled. Retryable.
    #[error("Throttled: {0}")]
    Throttling(String),

    /// The request was rejected as invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The caller is not authorized to perform the request.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request conflicts with the current state of the target.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request could not be parsed by the receiver.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The launch path does not refer to an existing, executable file.
    ///
    /// This only ever fails the single launch attempt that produced it.
    #[error("Bad executable path: {0}")]
    BadExecutablePath(String),

    /// The operating system refused to create the process for a reason other
    /// than a bad executable path.
    #[error("Failed to launch process: {0}")]
    ProcessLaunch(String),

    /// A new process was requested while compute is terminating.
    #[error("Compute is shutting down")]
    ComputeShuttingDown,

    /// A compute status transition was rejected by the state machine.
    #[error("Invalid compute status transition from {from} to {to}")]
    InvalidTransition {
        /// Status the machine was in.
        from: String,
        /// Status that was requested.
        to: String,
    },

    /// Error while querying or signalling a running process.
    #[error("Server process error: {0}")]
    Process(String),

    /// The requested process is not managed by this agent.
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    /// Error in communication with the control plane.
    #[error("Communication error: {0}")]
    Communication(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Error in serializing or deserializing data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failed to parse configuration from a file or string.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An unmodeled error survived every retry attempt.
    #[error("Operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of times the operation was invoked.
        attempts: u32,
        /// Last error observed.
        source: Box<Error>,
    },

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Classifies the error for the retry policy.
    ///
    /// Returns `Some(true)` for transient errors, `Some(false)` for permanent
    /// ones and `None` for errors the taxonomy does not model.
    pub fn retryable(&self) -> Option<bool> {
        match self {
            Error::InternalService(_)
            | Error::NotFound(_)
            | Error::NotReady(_)
            | Error::Throttling(_) => Some(true),
            Error::InvalidRequest(_)
            | Error::Unauthorized(_)
            | Error::Conflict(_)
            | Error::MalformedRequest(_)
            | Error::BadExecutablePath(_)
            | Error::ProcessLaunch(_)
            | Error::ComputeShuttingDown
            | Error::InvalidTransition { .. }
            | Error::RetriesExhausted { .. } => Some(false),
            Error::Process(_)
            | Error::ProcessNotFound(_)
            | Error::Communication(_)
            | Error::Timeout(_)
            | Error::Serialization(_)
            | Error::ConfigParse(_)
            | Error::ConfigInvalid(_)
            | Error::Io(_)
            | Error::Other(_) => None,
        }
    }

    /// True when the error belongs to the modeled taxonomy.
    pub fn is_modeled(&self) -> bool {
        self.retryable().is_some()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type for fleet agent operations.
pub type Result<T> = std::result::Result<T, Error>;
