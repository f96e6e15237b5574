//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries embedding the
//! agent call [`init`] once at startup to install a subscriber.
use crate::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set. Calling this
/// more than once is harmless; only the first call installs a subscriber.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        init(&config);
        init(&LoggingConfig {
            level: "not a valid directive ===".to_string(),
            json: true,
        });
    }
}
