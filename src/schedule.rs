//! Periodic background tasks.
//!
//! A naive interval loop dies with the first panic or stops being useful
//! after the first error. [`PeriodicTask`] logs both and keeps the schedule
//! running until it is stopped or dropped.
use crate::error::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a job running on a fixed interval.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns `job` to run every `interval`, first after one interval.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match AssertUnwindSafe(async { job().await }).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(task = name, error = %e, "Periodic task failed"),
                    Err(panic) => {
                        let message = panic
                            .downcast_ref::<&'static str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        tracing::error!(task = name, panic = %message, "Periodic task panicked");
                    }
                }
            }
        });
        tracing::debug!(task = name, ?interval, "Started periodic task");
        Self { name, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
        tracing::debug!(task = self.name, "Stopped periodic task");
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
