//! Clock abstraction and epoch conversions.

use std::fmt::Debug;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;

/// Source of the current instant.
///
/// Every "now" and "today" decision goes through a clock so that the
/// credential intervals and freshness rules can be exercised in tests.
pub trait Clock: Send + Sync + Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date (UTC).
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Convert a provider epoch value into a UTC instant.
///
/// Providers mix second and millisecond precision; the unit is detected
/// from the digit count (10 digits = seconds, 13 digits = milliseconds).
/// Any other width yields `None`.
#[must_use]
pub fn datetime_from_epoch(value: i64) -> Option<DateTime<Utc>> {
    match value.unsigned_abs().checked_ilog10().map(|log| log + 1) {
        Some(13) => DateTime::from_timestamp_millis(value),
        Some(10) => DateTime::from_timestamp(value, 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use test_case::test_case;

    use super::*;

    #[test]
    fn millisecond_epoch() {
        let dt = datetime_from_epoch(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(dt.year(), 2023);
    }

    #[test]
    fn second_epoch() {
        let dt = datetime_from_epoch(1_700_000_000).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.nanosecond(), 0);
    }

    #[test_case(0 ; "zero")]
    #[test_case(170_000_000 ; "nine digits")]
    #[test_case(17_000_000_000 ; "eleven digits")]
    #[test_case(170_000_000_000_000 ; "fifteen digits")]
    fn rejects_unknown_widths(value: i64) {
        assert!(datetime_from_epoch(value).is_none());
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::days(1));
        assert_eq!(clock.today(), (start + Duration::days(1)).date_naive());
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn system_clock_today_matches_now() {
        let clock = SystemClock;
        let now = clock.now();
        let today = clock.today();
        assert!(today == now.date_naive() || today == now.date_naive().succ_opt().unwrap());
    }
}
