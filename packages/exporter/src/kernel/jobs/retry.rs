//! Retry decisions for failed export attempts.
//!
//! Exponential backoff bounds load on a degraded downstream; jitter spreads
//! retries out when many jobs fail at once (e.g. a storage outage).

use std::time::Duration;

use rand::Rng;

use super::job::ErrorKind;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after which a retryable failure becomes terminal.
    pub max_attempts: i32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
    /// Random addition in `[0, jitter_window)` on top of the backoff.
    pub jitter_window: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            cap_delay: Duration::from_secs(15 * 60),
            jitter_window: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reschedule the job after the given delay.
    Retry(Duration),
    /// Fail the job terminally.
    GiveUp,
}

impl RetryPolicy {
    /// Default policy with a different attempt cap.
    pub fn with_max_attempts(max_attempts: i32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Decide what to do after attempt number `attempt_count` failed with
    /// `kind`. Attempt counts are 1-indexed (set at claim time).
    pub fn decide(&self, attempt_count: i32, kind: ErrorKind) -> RetryDecision {
        if !kind.should_retry() || attempt_count >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.delay_for_attempt(attempt_count))
    }

    /// Backoff for a 1-indexed attempt: `min(base * 2^(n-1), cap)` plus
    /// jitter.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let exp = attempt.saturating_sub(1).clamp(0, 31) as u32;
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.cap_delay);

        let jitter_ms = self.jitter_window.as_millis() as u64;
        if jitter_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_window: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(240));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(15 * 60));
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_secs(15 * 60));
    }

    #[test]
    fn jitter_stays_within_window() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_secs(60));
            assert!(delay < Duration::from_secs(65));
        }
    }

    #[test]
    fn retryable_failure_with_attempts_left_retries() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(1, ErrorKind::Retryable),
            RetryDecision::Retry(Duration::from_secs(60))
        );
        assert_eq!(
            policy.decide(2, ErrorKind::Retryable),
            RetryDecision::Retry(Duration::from_secs(120))
        );
    }

    #[test]
    fn exhausted_attempts_give_up() {
        let policy = no_jitter();
        assert_eq!(policy.decide(3, ErrorKind::Retryable), RetryDecision::GiveUp);
        assert_eq!(policy.decide(4, ErrorKind::Retryable), RetryDecision::GiveUp);
    }

    #[test]
    fn non_retryable_failure_gives_up_immediately() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(1, ErrorKind::NonRetryable),
            RetryDecision::GiveUp
        );
    }
}
