use std::time::Duration;

use reelqueue_core::config::{MAX_RETRIES, RETRY_BACKOFF_SECS};

/// Fixed-backoff retry bound for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pause before attempt `attempt + 1`. Constant; `attempt` is 1-based.
    pub fn delay(&self, _attempt: u32) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES, Duration::from_secs(RETRY_BACKOFF_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_two_attempts() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts(), 2);
        assert_eq!(p.delay(1), Duration::from_secs(3));
        assert_eq!(p.delay(5), p.delay(1));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::new(u32::MAX, Duration::ZERO).max_attempts(), u32::MAX);
    }
}
