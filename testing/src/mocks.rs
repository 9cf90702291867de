//! Deterministic clocks for tests.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;
use stockpile_core::clock::Clock;

/// Fixed clock for deterministic tests.
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use stockpile_testing::mocks::FixedClock;
/// use stockpile_core::clock::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// let time1 = clock.now();
/// let time2 = clock.now();
/// assert_eq!(time1, time2); // Always the same!
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// A clock that stands still until a test advances it.
///
/// Used for reservation expiry scenarios: reserve at `t`, advance past the
/// TTL, run the sweep, observe the expiry.
///
/// # Example
///
/// ```
/// use stockpile_testing::mocks::{SteppingClock, test_clock};
/// use stockpile_core::clock::Clock;
/// use chrono::TimeDelta;
///
/// let clock = SteppingClock::new(test_clock().now());
/// let start = clock.now();
/// clock.advance(TimeDelta::minutes(20));
/// assert_eq!(clock.now(), start + TimeDelta::minutes(20));
/// ```
#[derive(Debug)]
pub struct SteppingClock {
    time: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    /// Create a stepping clock starting at the given time.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned, which only happens after a
    /// panic in another test thread.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, delta: TimeDelta) {
        let mut time = self.time.lock().expect("clock lock poisoned");
        *time += delta;
    }
}

impl Clock for SteppingClock {
    #[allow(clippy::expect_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().expect("clock lock poisoned")
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// This function will panic if the hardcoded timestamp fails to parse,
/// which should never happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn stepping_clock_advances() {
        let clock = SteppingClock::new(test_clock().now());
        let start = clock.now();
        clock.advance(TimeDelta::seconds(90));
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));
    }
}
