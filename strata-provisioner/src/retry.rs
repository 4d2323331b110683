/// Retry policy for provisioning steps
///
/// Bounded exponential backoff with jitter. The delay for attempt `n`
/// (0-based) is `base * 2^n`, capped at `max_delay`, plus up to 25%
/// random jitter so a burst of failing jobs does not retry in lockstep.
///
/// # Defaults
///
/// - Max attempts per step: 5
/// - Base delay: 200ms
/// - Delay cap: 30 seconds

use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts per step, the first included
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Fast policy for tests: tight delays, same shape.
    pub fn fast(max_attempts: u32) -> Self {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(10),
        )
    }

    /// Whether another attempt is allowed after `attempts_so_far`.
    pub fn allows_retry(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }

    /// Deterministic backoff component for a 0-based attempt index.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let raw = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp));
        raw.min(self.max_delay)
    }

    /// Backoff with up to 25% added jitter; what the orchestrator sleeps.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if base.is_zero() {
            return base;
        }
        let jitter_budget = base / 4;
        let jitter_nanos = if jitter_budget.as_nanos() == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_budget.as_nanos() as u64)
        };
        base + Duration::from_nanos(jitter_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(100),
            Duration::from_millis(450),
        );
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(450)); // capped
        assert_eq!(policy.backoff(30), Duration::from_millis(450));
    }

    #[test]
    fn test_allows_retry_budget() {
        let policy = RetryPolicy::new(3, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY);
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!policy.allows_retry(10));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy::default();
        for attempt in 0..6 {
            let base = policy.backoff(attempt);
            for _ in 0..20 {
                let delay = policy.delay_for(attempt);
                assert!(delay >= base);
                assert!(delay <= base + base / 4 + Duration::from_nanos(1));
            }
        }
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(u32::MAX), DEFAULT_MAX_DELAY);
    }
}
