//! Time abstraction for testability.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations so reservation TTLs and expiry
/// can be tested deterministically.
///
/// Production code uses [`SystemClock`]; tests use the fixed and stepping
/// clocks from `stockpile-testing`.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
