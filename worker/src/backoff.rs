//! Doubling backoff for retry loops.

use std::time::Duration;

/// Delay schedule that doubles on every attempt, up to a cap.
///
/// Attempt numbering starts at zero: attempt 0 waits the initial delay,
/// attempt 1 waits twice that, and so on.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
}

impl Backoff {
    /// Create a schedule starting at `initial` and capped at `cap`.
    #[must_use]
    pub const fn new(initial: Duration, cap: Duration) -> Self {
        Self { initial, cap }
    }

    /// Delay before retrying after the given failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_each_attempt() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(30));

        assert_eq!(backoff.delay_for(0), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(16));
    }

    #[test]
    fn delay_is_capped() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(30));

        assert_eq!(backoff.delay_for(4), Duration::from_secs(30));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(30));
    }
}
