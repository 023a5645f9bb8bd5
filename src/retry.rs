//! Retry with exponential backoff for report downloads.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::TapError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * 2^n` plus jitter.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to `base_delay / 2` of random jitter, on top of `max_delay`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        // Jitter applies after the cap.
        let limit = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        if limit == 0 {
            return capped;
        }
        capped + Duration::from_millis(fastrand::u64(0..limit))
    }
}

/// Outcome of one attempt.
pub enum Attempt<T> {
    Done(T),
    /// Transient failure. `retry_after` comes from a `Retry-After` header.
    Retry {
        message: String,
        retry_after: Option<Duration>,
    },
    Fail(TapError),
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// Exhausted retries end in [`TapError::Transport`] carrying the last message.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T, TapError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(err) => return Err(err),
            Attempt::Retry {
                message,
                retry_after,
            } => {
                if attempt >= policy.max_retries {
                    return Err(TapError::Transport {
                        attempts: attempt + 1,
                        message,
                    });
                }
                let mut delay = policy.delay_for_attempt(attempt);
                if let Some(server_delay) = retry_after {
                    delay = delay.max(server_delay);
                }
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
