//! The backoff switch is process-wide, so it gets a test binary of its own
//! and cannot disturb the timing assertions in `retry_tests.rs`.

use fleet_agent::error::Error;
use fleet_agent::retry::{RetryPolicy, force_disable_backoff, is_backoff_force_disabled};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_disabled_backoff_retries_without_sleeping() {
    force_disable_backoff(true);
    assert!(is_backoff_force_disabled());

    let policy = RetryPolicy::new(Duration::from_secs(60));
    let calls = AtomicU32::new(0);
    let started = tokio::time::Instant::now();

    let value = policy
        .run_retryable(4, true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 3 {
                    Err(Error::Throttling("busy".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    force_disable_backoff(false);

    assert_eq!(value.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(!is_backoff_force_disabled());
}
