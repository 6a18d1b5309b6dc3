//! Retry with exponential backoff, filtered by error category.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ErrorCategory, PoolError};

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay before retry number `attempt` (0 = first retry).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Which failures are retried, how often, and how long to wait in between.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable: Vec<ErrorCategory>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            retryable: vec![
                ErrorCategory::Connection,
                ErrorCategory::Timeout,
                ErrorCategory::System,
            ],
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable category, or the
/// attempts run out. The last error is returned unchanged.
///
/// `op` receives the zero-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, PoolError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PoolError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempt = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable_in(&policy.retryable) => {
                debug!(operation, category = %e.category(), "not retrying");
                return Err(e);
            }
            Err(e) if attempt + 1 >= attempts => {
                warn!(operation, attempts, error = %e, "retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.backoff.delay(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
