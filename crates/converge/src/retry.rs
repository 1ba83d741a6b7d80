//! Retry logic with exponential backoff for transient provider errors.

use crate::error::ProviderError;
use std::thread;
use std::time::Duration;

/// Backoff policy for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Retry without sleeping. Useful for tests and simulated providers.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }
}

/// Callback for retry notifications.
pub trait RetryCallback {
    /// Called before sleeping ahead of the next attempt.
    ///
    /// `attempt` is the attempt that just failed (1-indexed).
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ProviderError, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &ProviderError, _delay: Duration) {}
}

/// Outcome of a retried operation plus the number of attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ProviderError>,
    pub attempts: u32,
}

/// Execute an operation, retrying retryable errors with exponential backoff.
///
/// Permanent errors return immediately. Returns the last error once
/// `max_attempts` is exhausted.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: &dyn RetryCallback,
    mut operation: F,
) -> Attempted<T>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation() {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if !e.is_retryable() || attempt >= max_attempts => {
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) => {
                let delay = config.delay_for_attempt(attempt - 1);
                log::warn!("Attempt {attempt}/{max_attempts} failed: {e}. Retrying in {delay:?}");
                callback.on_retry(attempt, max_attempts, &e, delay);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }
    }
}
