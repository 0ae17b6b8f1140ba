//! Calendar abstraction for testability.
//!
//! The Letter Filter compares competition dates against "today"; routing that
//! through a [`Clock`] keeps date-dependent tests deterministic.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use tatami_core::time::{Clock, MockClock};
//!
//! let clock = MockClock::new(NaiveDate::from_ymd_opt(2099, 5, 1).unwrap());
//! clock.advance_days(1);
//! assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2099, 5, 2).unwrap());
//! ```

use std::sync::atomic::{AtomicI32, Ordering};

use chrono::{Datelike, Local, NaiveDate};

/// Source of the current date.
pub trait Clock: Send + Sync {
    /// Today's date in local time.
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the system's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock whose date only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    days_from_ce: AtomicI32,
}

impl MockClock {
    /// Creates a clock fixed at `date`.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            days_from_ce: AtomicI32::new(date.num_days_from_ce()),
        }
    }

    /// Moves the clock to `date`.
    pub fn set(&self, date: NaiveDate) {
        self.days_from_ce
            .store(date.num_days_from_ce(), Ordering::SeqCst);
    }

    /// Moves the clock forward by `days`.
    pub fn advance_days(&self, days: i32) {
        self.days_from_ce.fetch_add(days, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn today(&self) -> NaiveDate {
        let days = self.days_from_ce.load(Ordering::SeqCst);
        NaiveDate::from_num_days_from_ce_opt(days).unwrap_or(NaiveDate::MAX)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_moves_only_when_told() {
        let start = NaiveDate::from_ymd_opt(2099, 12, 31).unwrap();
        let clock = MockClock::new(start);
        assert_eq!(clock.today(), start);

        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2100, 1, 1).unwrap());

        clock.set(start);
        assert_eq!(clock.today(), start);
    }

    #[test]
    fn system_clock_is_usable_as_trait_object() {
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        assert!(clock.today() > NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    }
}
