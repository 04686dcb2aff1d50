//! Fixed-delay retry for store batches.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default number of attempts per batch.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Default pause between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);

/// How often and how patiently a failed batch is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Attempts actually made before giving up.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// Sleeps `policy.delay` between attempts, never after the last one. The
/// error of the final attempt is returned.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max => {
                tracing::error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "Giving up"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = max,
                    error = %e,
                    "Failed, retrying in {:?}",
                    policy.delay
                );
                sleep(policy.delay).await;
            }
        }
    }
}
