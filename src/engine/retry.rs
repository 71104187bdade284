// src/engine/retry.rs

use std::time::Duration;

use crate::types::ErrorKind;

/// Exponential backoff with a cap.
///
/// Only [`ErrorKind::is_retryable`] failures are retried, and never beyond
/// `max_attempts` attempts in total.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1 and `backoff_multiplier` to
    /// at least 1.0.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Run every task exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0, Duration::ZERO)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, 1.0, delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }

    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(350),
        );
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(400), Duration::from_millis(350));
    }

    #[test]
    fn only_retryable_kinds_within_budget() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        assert!(policy.should_retry(ErrorKind::Transient, 1));
        assert!(policy.should_retry(ErrorKind::Timeout, 2));
        assert!(!policy.should_retry(ErrorKind::Transient, 3));
        for kind in [
            ErrorKind::Permanent,
            ErrorKind::Fatal,
            ErrorKind::Cancelled,
            ErrorKind::UnknownTaskKind,
        ] {
            assert!(!policy.should_retry(kind, 1), "{kind} must not retry");
        }
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }
}
