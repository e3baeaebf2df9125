//! Backoff schedule for transient task failures.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Exponential backoff with additive jitter.
///
/// The delay for a task that has already been retried `retry_count` times is
/// `base * 2^retry_count`, capped at `max_delay`, plus a uniform jitter in
/// `[0, jitter)`. The result is never zero.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            jitter: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter: base,
        }
    }

    /// Deterministic part of the delay.
    pub fn backoff(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.clamp(0, 30) as u32;
        let base_ms = self.base.as_millis().max(1) as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay_ms).min(self.max_delay.max(Duration::from_millis(1)))
    }

    /// Full delay including jitter.
    pub fn next_delay(&self, retry_count: i32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..jitter_ms)
        };
        self.backoff(retry_count) + Duration::from_millis(jitter)
    }

    /// When a task failing at `now` becomes eligible again.
    pub fn next_run_after(&self, retry_count: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.next_delay(retry_count))
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        now + delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(30), Duration::from_secs(300));

        assert_eq!(policy.backoff(0), Duration::from_secs(30));
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(4), Duration::from_secs(300));
        assert_eq!(policy.backoff(i32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(3600));
        for _ in 0..200 {
            let delay = policy.next_delay(1);
            assert!(delay >= Duration::from_secs(20));
            assert!(delay < Duration::from_secs(30));
        }
    }

    #[test]
    fn test_run_after_is_strictly_later() {
        let policy = RetryPolicy {
            base: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        };
        let now = Utc::now();
        assert!(policy.next_run_after(0, now) > now);
    }

    proptest::proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(retry in 0i32..64, base_secs in 1u64..600) {
            let policy = RetryPolicy::new(Duration::from_secs(base_secs), Duration::from_secs(3600));
            let current = policy.backoff(retry);
            proptest::prop_assert!(current <= Duration::from_secs(3600));
            proptest::prop_assert!(policy.backoff(retry + 1) >= current);
        }
    }
}
