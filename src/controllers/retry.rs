// Exponential backoff with jitter, shared by every per-kind controller's
// reconcile loop.

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl RetryStrategy {
    pub fn should_retry(&self, attempt: u32, err: &Error) -> bool {
        attempt < self.max_retries && err.is_retryable() && !err.is_critical()
    }

    /// `min(base * 2^attempt + jitter, maxDelay)`, jitter up to 25% of the
    /// capped exponential delay.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(32));
        let capped = exp_ms.min(max_ms);
        let jitter_max = (capped as f64 * 0.25) as u64;
        let jitter = if jitter_max > 0 {
            rand::thread_rng().gen_range(0..=jitter_max)
        } else {
            0
        };
        Duration::from_millis((capped + jitter).min(max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_retrying_after_max_retries() {
        let strategy = RetryStrategy::default();
        assert!(strategy.should_retry(4, &Error::Timeout));
        assert!(!strategy.should_retry(5, &Error::Timeout));
    }

    #[test]
    fn non_retryable_errors_are_never_retried() {
        let strategy = RetryStrategy::default();
        assert!(!strategy.should_retry(0, &Error::ValidationFailed("x".into())));
    }

    #[test]
    fn delay_never_exceeds_max_delay_plus_jitter_bound() {
        let strategy = RetryStrategy {
            base: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            max_retries: 10,
        };
        for attempt in 0..10 {
            let delay = strategy.next_delay(attempt);
            assert!(delay <= Duration::from_secs(1));
        }
    }
}
