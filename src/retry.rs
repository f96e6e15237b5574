//! # Retry policy for transient control-plane failures.
//!
//! [`RetryPolicy::run_retryable`] re-invokes an operation until it succeeds,
//! fails with an error classified as non-retryable, or runs out of attempts.
//!
//! The delay before retry `n` (0-indexed) is `backoff_factor × 2^n × jitter`
//! where `jitter` is drawn uniformly from `[1 − J, 1 + J]` with `J = 0.25`.
//! The delay is only slept when backoff is requested, the error is retryable
//! and another attempt remains.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use fleet_agent::error::Error;
//! use fleet_agent::retry::RetryPolicy;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let policy = RetryPolicy::new(Duration::from_millis(1));
//! let mut calls = 0;
//! let value = policy
//!     .run_retryable(3, true, || {
//!         calls += 1;
//!         let attempt = calls;
//!         async move {
//!             if attempt < 3 {
//!                 Err(Error::Throttling("slow down".into()))
//!             } else {
//!                 Ok(attempt)
//!             }
//!         }
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(value, 3);
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// Half-width of the uniform jitter band applied to every delay.
pub const JITTER: f64 = 0.25;

/// Default base delay.
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_millis(500);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Upper bound on a single computed delay.
const MAX_DELAY: Duration = Duration::from_secs(300);

static FORCE_DISABLE_BACKOFF: AtomicBool = AtomicBool::new(false);

/// Turns every backoff sleep into a no-op for the whole process.
///
/// Only meant for tests that need deterministic timing.
pub fn force_disable_backoff(disabled: bool) {
    FORCE_DISABLE_BACKOFF.store(disabled, Ordering::SeqCst);
}

/// Returns whether backoff has been disabled process-wide.
pub fn is_backoff_force_disabled() -> bool {
    FORCE_DISABLE_BACKOFF.load(Ordering::SeqCst)
}

/// Retry-with-backoff executor.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay multiplied by `2^attempt`.
    pub backoff_factor: Duration,
    /// Half-width of the jitter band.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_FACTOR)
    }
}

impl RetryPolicy {
    /// Creates a policy with the given base delay and the standard jitter.
    pub fn new(backoff_factor: Duration) -> Self {
        Self {
            backoff_factor,
            jitter: JITTER,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let multiplier = if jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.backoff_factor.as_secs_f64() * 2f64.powi(exp) * multiplier;

        if !secs.is_finite() || secs < 0.0 || secs > MAX_DELAY.as_secs_f64() {
            MAX_DELAY
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Runs `operation` up to `max_retries + 1` times.
    ///
    /// Errors flagged non-retryable are returned after the attempt that
    /// produced them. When every attempt fails, a modeled error is returned
    /// unchanged and an unmodeled one is wrapped in
    /// [`Error::RetriesExhausted`].
    pub async fn run_retryable<T, F, Fut>(
        &self,
        max_retries: u32,
        use_backoff: bool,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let retryable = err.retryable().unwrap_or(true);
            if !retryable {
                tracing::debug!(attempt, error = %err, "Operation failed with non-retryable error");
                return Err(err);
            }

            if attempt >= max_retries {
                tracing::warn!(attempts = attempt + 1, error = %err, "Retries exhausted");
                return Err(if err.is_modeled() {
                    err
                } else {
                    Error::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(err),
                    }
                });
            }

            if use_backoff && !is_backoff_force_disabled() {
                let delay = self.delay(attempt);
                tracing::debug!(attempt, ?delay, error = %err, "Retrying after backoff");
                tokio::time::sleep(delay).await;
            } else {
                tracing::debug!(attempt, error = %err, "Retrying without backoff");
            }
            attempt += 1;
        }
    }
}
