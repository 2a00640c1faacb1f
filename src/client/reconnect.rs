//! Reconnect backoff policy.
//!
//! After the connection drops, the client retries with a growing delay
//! until an attempt succeeds or the attempt bound is reached. A successful
//! connect resets the schedule.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Backoff delays: immediate, 1s, 2s, 5s, 10s, then 10s from there on.
const BACKOFF_DELAYS: [Duration; 5] = [
    Duration::from_secs(0),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Default attempt bound.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Attempt bound and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum consecutive attempts. `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Delay before each attempt. The last entry repeats.
    pub delays: Vec<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            delays: BACKOFF_DELAYS.to_vec(),
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy with a fixed delay.
    #[must_use]
    pub fn fixed(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            delays: vec![delay],
        }
    }

    /// Sets the attempt bound.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the backoff schedule.
    #[inline]
    #[must_use]
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Returns the delay before attempt `attempt` (zero-based), or `None`
    /// once the bound is reached.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        let index = (attempt as usize).min(self.delays.len().saturating_sub(1));
        Some(self.delays.get(index).copied().unwrap_or_default())
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Attempt counter over a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Starts a fresh schedule.
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Consumes one attempt and returns its delay, or `None` to give up.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.policy.delay_for(self.attempt)?;
        self.attempt += 1;
        Some(delay)
    }

    /// Returns the number of attempts consumed.
    #[inline]
    pub(crate) fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Resets the schedule after a successful connect.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = Backoff::new(ReconnectPolicy::default().with_max_attempts(None));

        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(0)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
        // Stays at max
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut backoff = Backoff::new(ReconnectPolicy::fixed(Duration::from_millis(100), Some(2)));

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::ZERO));
    }

    #[test]
    fn test_empty_schedule_is_immediate() {
        let policy = ReconnectPolicy::default().with_delays(Vec::new());
        assert_eq!(policy.delay_for(3), Some(Duration::ZERO));
    }
}
