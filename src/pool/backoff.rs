// Login retry schedule — explicit attempt-count state machine.
//
// The pool retries a failed login a bounded number of times with a linearly
// increasing delay plus jitter. Expressed as data (attempt number in,
// delay or terminal failure out) so the formula is testable without
// sleeping and the loop never recurses.

use std::time::Duration;

/// Bounded linear-backoff schedule for one account's login attempts.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    /// Total attempts allowed per account per acquisition (first try included).
    pub max_attempts: u32,
    /// Delay grows by this much per failed attempt.
    pub base_delay: Duration,
    /// Upper bound on the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetrySchedule {
    /// A schedule with no delays — used by tests to keep retries instant.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// The deterministic part of the backoff: base_delay * attempt.
    /// Attempt numbers start at 1 (the delay before the second try).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// The delay to sleep before retry number `attempt`, or None when the
    /// schedule is exhausted and the failure is terminal.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.backoff_delay(attempt) + self.jitter())
    }

    /// Pseudo-random jitter below max_jitter, derived from the sub-second
    /// nanos of the current time. Enough variation to de-synchronize
    /// retries without pulling in `rand` just for this.
    fn jitter(&self) -> Duration {
        let max_nanos = self.max_jitter.as_nanos() as u64;
        if max_nanos == 0 {
            return Duration::ZERO;
        }
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        Duration::from_nanos(nanos % max_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_linearly() {
        let schedule = RetrySchedule {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(schedule.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(schedule.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(schedule.backoff_delay(3), Duration::from_secs(6));
    }

    #[test]
    fn test_schedule_is_bounded() {
        let schedule = RetrySchedule {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::ZERO,
        };
        assert!(schedule.delay_for(1).is_some());
        assert!(schedule.delay_for(2).is_some());
        // The third failure is terminal: no delay, move to the next account
        assert!(schedule.delay_for(3).is_none());
        assert!(schedule.delay_for(4).is_none());
    }

    #[test]
    fn test_jitter_stays_under_bound() {
        let schedule = RetrySchedule {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
        };
        for attempt in 1..10 {
            let delay = schedule.delay_for(attempt).unwrap();
            let deterministic = schedule.backoff_delay(attempt);
            assert!(delay >= deterministic);
            assert!(delay < deterministic + Duration::from_millis(500));
        }
    }

    #[test]
    fn test_immediate_schedule_has_no_delay() {
        let schedule = RetrySchedule::immediate(3);
        assert_eq!(schedule.delay_for(1), Some(Duration::ZERO));
        assert_eq!(schedule.delay_for(3), None);
    }
}
