use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::ApiError;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    /// A server-supplied `Retry-After` wins when longer; both are capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let backoff = Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64);

        match retry_after {
            Some(hint) if hint > backoff => hint.min(self.max_delay),
            _ => backoff,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or the
/// attempt cap is reached. The closure receives the 1-based attempt number.
pub fn retry_with_backoff<T, F>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, ApiError>
where
    F: FnMut(u32) -> Result<T, ApiError>,
{
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => {
                debug!("{} failed with non-retryable error: {}", label, err);
                return Err(err);
            }
            Err(err) if attempt >= policy.max_attempts => {
                error!("{} failed after {} attempts: {}", label, attempt, err);
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt, err.retry_after());
                warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    label, attempt, policy.max_attempts, err, delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
