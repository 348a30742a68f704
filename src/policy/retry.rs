//! Retry policy with capped exponential backoff and symmetric jitter.
//!
//! Shared by the prepare and token-request paths of every attestation
//! variant:
//! - each attempt is bounded by `attempt_timeout` (a timeout is retryable)
//! - platform errors are classified by the caller as retryable or fatal
//! - between retryable attempts the runner sleeps `backoff_delay(n)`

use crate::attestation::platform::PlatformError;
use crate::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound on the un-jittered delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(8000);

/// Default jitter, as a fraction of the capped delay.
pub const DEFAULT_JITTER: f64 = 0.25;

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Retry parameters for attestation operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,

    /// Cap applied before jitter.
    pub max_delay: Duration,

    /// Symmetric jitter as a fraction of the capped delay (0.25 = ±25%).
    pub jitter: f64,

    /// Timeout for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Validate the policy for obvious errors.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.max_attempts == 0 {
            return Err(GatewayError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(GatewayError::ConfigError(format!(
                "retry.max_delay ({:?}) must not be below retry.base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(GatewayError::ConfigError(format!(
                "retry.jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.attempt_timeout.is_zero() {
            return Err(GatewayError::ConfigError(
                "retry.attempt_timeout cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Un-jittered delay after the failed attempt `attempt` (0-indexed):
    /// `min(base_delay * 2^attempt, max_delay)`.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Jittered delay after the failed attempt `attempt` (0-indexed).
    ///
    /// Always within `capped_delay(attempt) * [1 - jitter, 1 + jitter]`.
    pub fn backoff_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let capped = self.capped_delay(attempt).as_secs_f64();
        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(capped);
        }
        let offset = rng.gen_range(-self.jitter..=self.jitter);
        Duration::from_secs_f64((capped * (1.0 + offset)).max(0.0))
    }

    /// Run `attempt` until it succeeds, fails fatally, or the attempts run out.
    ///
    /// # Errors
    /// * `Platform` - first error the classifier rejected (loop stops at once)
    /// * `RetriesExhausted` - every attempt failed with a retryable error or timed out
    pub async fn run<T, F, Fut, C>(
        &self,
        operation: &'static str,
        is_retryable: C,
        mut attempt: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
        C: Fn(&PlatformError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            let error = match tokio::time::timeout(self.attempt_timeout, attempt()).await {
                Ok(Ok(value)) => {
                    if attempts > 0 {
                        tracing::debug!(operation, attempts = attempts + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(platform_error)) => {
                    if !is_retryable(&platform_error) {
                        tracing::warn!(
                            operation,
                            attempt = attempts + 1,
                            code = platform_error.code,
                            "non-retryable platform error"
                        );
                        return Err(GatewayError::Platform(platform_error));
                    }
                    GatewayError::Platform(platform_error)
                }
                Err(_elapsed) => GatewayError::AttemptTimedOut {
                    operation,
                    timeout: self.attempt_timeout,
                },
            };

            attempts += 1;
            if attempts >= max_attempts {
                return Err(GatewayError::RetriesExhausted {
                    operation,
                    attempts,
                    last: Box::new(error),
                });
            }

            let delay = self.backoff_delay(attempts - 1, &mut rand::thread_rng());
            tracing::warn!(
                operation,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
