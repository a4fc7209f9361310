// ABOUTME: Bounded retry with linear backoff for network operations.
// ABOUTME: Only the source fetch uses this; builds are deterministic and never retried.

use std::time::Duration;

/// Attempts and backoff for one retryable operation.
///
/// Backoff is linear (`base_delay * attempt_number`), not exponential, to
/// keep the total wait bounded: with the default 3 attempts and a 5s base
/// the pipeline never sleeps more than 15s in total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

/// All attempts failed; carries the attempt count and the last cause.
#[derive(Debug, thiserror::Error)]
#[error("'{label}' failed after {attempts} attempt(s): {cause}")]
pub struct Exhausted {
    pub label: String,
    pub attempts: u32,
    pub cause: String,
}

impl RetryPolicy {
    /// Run `op` up to `max_attempts` times. Success on any attempt
    /// short-circuits; after failed attempt `n` the runner sleeps
    /// `base_delay * n` before trying again. The closure receives the
    /// 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_cause = String::new();

        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_cause = e.to_string();
                    tracing::warn!(label, attempt, attempts, "attempt failed: {last_cause}");
                    if attempt < attempts {
                        let delay = self.base_delay * attempt;
                        tracing::debug!(label, ?delay, "backing off before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(Exhausted {
            label: label.to_string(),
            attempts,
            cause: last_cause,
        })
    }
}
