use std::sync::{Mutex, PoisonError};

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Source of naive local wall-clock time. Every horizon, reminder and
/// completion decision reads the clock through this trait.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Settable clock for tests and dry runs.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 9)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.today(), start.date());
        clock.advance(Duration::minutes(45));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
