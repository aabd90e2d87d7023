//! Bounded retry with exponential backoff, and gateway call timeouts.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::ports::GatewayError;

/// Retry schedule for idempotent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Retries `operation` until it succeeds, returns a non-retryable error,
/// or the policy runs out of attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    context: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context = %context, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= policy.max_attempts || !is_retryable(&e) => {
                warn!(
                    context = %context,
                    attempts = attempt,
                    error = %e,
                    "Operation failed, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    context = %context,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying with backoff"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Bounds a gateway call. Elapsed maps to [`GatewayError::timeout`].
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::timeout()),
    }
}
