//! Bounded exponential backoff for rate-limited tracker calls.
//!
//! Only [`TrackerError::RateLimited`] is retried. Any other error is handed
//! back to the caller on the first attempt.

use std::thread;
use std::time::Duration;

use tracing::warn;

use super::TrackerError;
use crate::config::RetryConfig;

/// Retry schedule applied to every tracker call made by the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Multiplier applied to the delay after every failed attempt.
    pub backoff_factor: f64,
    /// Delay before the second attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_factor: config.backoff_factor,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// A policy that never sleeps. Handy for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_factor: 1.0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the failed attempt `attempt` (0-based).
    ///
    /// A server-provided `Retry-After` wins when it is longer than the
    /// computed backoff.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let computed = self
            .base_delay
            .mul_f64(self.backoff_factor.max(1.0).powi(exponent).min(1.0e6));
        retry_after.map_or(computed, |server| server.max(computed))
    }

    /// Run `call`, retrying while it reports a rate limit.
    ///
    /// # Errors
    ///
    /// Returns the first non-rate-limit error, or the last rate-limit error
    /// once `max_attempts` is exhausted.
    pub fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T, TrackerError>
    where
        F: FnMut() -> Result<T, TrackerError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(TrackerError::RateLimited {
                    operation: op,
                    retry_after,
                }) if attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "rate limited during {op}, backing off"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn rate_limited() -> TrackerError {
        TrackerError::RateLimited {
            operation: "list_issues".to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn succeeds_after_transient_rate_limits() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::immediate(3);
        let result = policy.run("list_issues", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(rate_limited())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::immediate(3);
        let result: Result<(), _> = policy.run("list_issues", || {
            calls.set(calls.get() + 1);
            Err(rate_limited())
        });
        assert!(result.expect_err("should fail").is_rate_limited());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::immediate(5);
        let result: Result<(), _> = policy.run("get_issue", || {
            calls.set(calls.get() + 1);
            Err(TrackerError::NotFound {
                resource: "issue #9".to_string(),
            })
        });
        assert!(matches!(result, Err(TrackerError::NotFound { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_factor: 2.0,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(400));
    }

    #[test]
    fn server_retry_after_wins_when_longer() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_factor: 2.0,
            base_delay: Duration::from_millis(100),
        };
        let server = Duration::from_secs(5);
        assert_eq!(policy.delay_for(0, Some(server)), server);
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_millis(1))),
            Duration::from_millis(100)
        );
    }
}
