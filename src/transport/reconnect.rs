//! Reconnection backoff.
//!
//! [`ReconnectPolicy`] is the configuration, [`Backoff`] the per-supervisor
//! state. The delay grows exponentially from `base_delay` and is capped at
//! `max_delay`. Failed opens are counted separately from delays, so a lost
//! connection backs off without using up `max_attempts`. A successful open
//! resets both.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Configuration for automatic reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Growth factor per failed attempt.
    pub multiplier: f64,
    /// Shave up to 10% off each delay to spread out reconnect storms.
    pub jitter: bool,
    /// Maximum consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    /// Creates the default policy: 1s doubling up to 30s, jittered, unbounded.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            max_attempts: None,
        }
    }

    /// Sets the first retry delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay ceiling.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Limits the number of consecutive failed attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Returns the un-jittered delay for a 0-indexed attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let multiplier = self.multiplier.max(1.0);

        let delay_ms = base_ms * multiplier.powi(attempt.min(64) as i32);
        Duration::from_millis(delay_ms.min(max_ms) as u64)
    }

    /// Starts a fresh attempt counter.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
            failures: 0,
        }
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Delay and failure counters driven by the connection supervisor.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    /// Delays handed out since the last reset.
    attempt: u32,
    /// Consecutive failed opens since the last reset.
    failures: u32,
}

impl Backoff {
    /// Number of delays handed out since the last reset.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Number of consecutive failed opens since the last reset.
    #[inline]
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Counts one failed open.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Returns `false` once `max_attempts` consecutive opens have failed.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.policy
            .max_attempts
            .is_none_or(|max| self.failures < max)
    }

    /// Returns the delay before the next attempt and advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        if !self.policy.jitter {
            return delay;
        }

        let factor: f64 = rand::thread_rng().gen_range(0.9..=1.0);
        delay.mul_f64(factor)
    }

    /// Resets both counters after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.failures = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> ReconnectPolicy {
        ReconnectPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(false)
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = fixed();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_is_monotonic_without_jitter() {
        let mut backoff = fixed().backoff();
        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(1));
            previous = delay;
        }
    }

    #[test]
    fn test_reset_restarts_from_base() {
        let mut backoff = fixed().backoff();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_max_attempts_counts_failures() {
        let mut backoff = fixed().with_max_attempts(2).backoff();
        assert!(backoff.should_retry());

        backoff.record_failure();
        backoff.next_delay();
        assert!(backoff.should_retry());

        backoff.record_failure();
        assert_eq!(backoff.failures(), 2);
        assert!(!backoff.should_retry());
    }

    #[test]
    fn test_delays_do_not_use_up_attempts() {
        let mut backoff = fixed().with_max_attempts(1).backoff();
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert!(backoff.should_retry());

        backoff.record_failure();
        assert!(!backoff.should_retry());

        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert!(backoff.should_retry());
    }

    #[test]
    fn test_jitter_stays_under_ceiling() {
        let mut backoff = fixed().with_jitter(true).backoff();
        for attempt in 0..8 {
            let ceiling = fixed().delay_for_attempt(attempt);
            let delay = backoff.next_delay();
            assert!(delay <= ceiling);
            assert!(delay >= ceiling.mul_f64(0.9));
        }
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut backoff = ReconnectPolicy::default().backoff();
        for _ in 0..1000 {
            backoff.record_failure();
            backoff.next_delay();
        }
        assert!(backoff.should_retry());
    }
}
