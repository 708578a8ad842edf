//! Bounded retry with exponential backoff for remote cart calls.
//!
//! The default policy makes a single attempt. Set `CART_SYNC_RETRY_ATTEMPTS`
//! to retry transient failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::CartStoreError;

/// How many times to try a remote call and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// One attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Up to `max_attempts` attempts, doubling the delay from `base_delay`
    /// and capping it at `max_delay`. Zero attempts is treated as one.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Backoff plus up to 50% random jitter.
    fn jittered_backoff(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        let jitter_ms = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// Run `call` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up.
    ///
    /// # Errors
    ///
    /// Returns the last error from `call`.
    pub async fn run<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, CartStoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CartStoreError>>,
    {
        self.run_if(operation, CartStoreError::is_transient, call)
            .await
    }

    /// Like [`Self::run`], but only errors matching `retryable` are retried.
    ///
    /// # Errors
    ///
    /// Returns the last error from `call`.
    pub async fn run_if<T, F, Fut>(
        &self,
        operation: &str,
        retryable: fn(&CartStoreError) -> bool,
        mut call: F,
    ) -> Result<T, CartStoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CartStoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) && attempt < self.max_attempts => {
                    let delay = self.jittered_backoff(attempt);
                    tracing::debug!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying cart store call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
