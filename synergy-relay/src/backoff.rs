//! Retry timing.
//!
//! Two independent policies use the same state machine:
//! - connection retries (1s doubling up to 60s, unbounded attempts)
//! - per-message publish retries (`RetryLadder`: 2s, 4s, at most 3 attempts)

use std::time::Duration;

/// Exponential delay: each `next_delay` hands out the scheduled delay and
/// schedules `min(delay * multiplier, max)` for the following call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    initial: Duration,
    multiplier: u32,
    max: Duration,
    current: Duration,
}

impl BackoffPolicy {
    pub const DEFAULT_INITIAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_MULTIPLIER: u32 = 2;
    pub const DEFAULT_MAX: Duration = Duration::from_secs(60);

    /// `initial` is clamped to `max` so the delay always stays in `[initial, max]`.
    pub fn new(initial: Duration, multiplier: u32, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            multiplier: multiplier.max(1),
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Delay the next `next_delay` call will return.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_INITIAL,
            Self::DEFAULT_MULTIPLIER,
            Self::DEFAULT_MAX,
        )
    }
}

/// Bounded per-message retry policy, kept separate from the connection backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryLadder {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RetryLadder {
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Called at the start of every message.
    pub fn restart(&mut self) {
        self.backoff.reset();
    }

    /// Wait before the attempt following `attempt` (1-based), `None` once exhausted.
    pub fn wait_after(&mut self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.backoff.next_delay())
    }
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_ATTEMPTS,
            BackoffPolicy::new(Duration::from_secs(2), 2, Duration::from_secs(60)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_defaults() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial(), secs(1));
        assert_eq!(policy.max(), secs(60));
        assert_eq!(policy.current(), secs(1));
    }

    #[test]
    fn test_nth_delay_is_capped_power_of_multiplier() {
        let mut policy = BackoffPolicy::default();
        for n in 1..=12u32 {
            let expected = secs(2u64.pow(n - 1)).min(secs(60));
            assert_eq!(policy.next_delay(), expected, "attempt {n}");
        }
    }

    #[test]
    fn test_delay_never_leaves_bounds() {
        let mut policy = BackoffPolicy::new(secs(3), 3, secs(50));
        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            let delay = policy.next_delay();
            assert!(delay >= secs(3) && delay <= secs(50));
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_reset_after_success() {
        let mut policy = BackoffPolicy::default();
        policy.next_delay();
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.current(), secs(8));
        policy.reset();
        assert_eq!(policy.next_delay(), secs(1));
    }

    #[test]
    fn test_initial_clamped_to_max() {
        let mut policy = BackoffPolicy::new(secs(90), 2, secs(60));
        assert_eq!(policy.next_delay(), secs(60));
        assert_eq!(policy.next_delay(), secs(60));
    }

    #[test]
    fn test_huge_multiplier_saturates_at_max() {
        let mut policy = BackoffPolicy::new(secs(1), u32::MAX, Duration::MAX);
        for _ in 0..3 {
            policy.next_delay();
        }
        assert_eq!(policy.next_delay(), Duration::MAX);
    }

    #[test]
    fn test_retry_ladder_waits() {
        let mut ladder = RetryLadder::default();
        ladder.restart();
        assert_eq!(ladder.wait_after(1), Some(secs(2)));
        assert_eq!(ladder.wait_after(2), Some(secs(4)));
        assert_eq!(ladder.wait_after(3), None);

        // next message starts over
        ladder.restart();
        assert_eq!(ladder.wait_after(1), Some(secs(2)));
    }
}
