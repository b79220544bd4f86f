//! Time source abstraction.
//!
//! Every engine operation takes `now` explicitly; the clock only exists for
//! drivers (the CLI tick loop) that need to ask for it.

use chrono::{Duration, Local, NaiveDateTime};
use std::sync::{Mutex, PoisonError};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the local timezone. Time-of-day windows are local.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
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

/// Seconds from `earlier` to `later`; a clock that went backwards yields 0.
pub fn elapsed_secs(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    let millis = (later - earlier).num_milliseconds();
    (millis.max(0) as f64) / 1000.0
}

/// `at` shifted by `secs`, saturating at the ends of the calendar instead of
/// overflowing.
pub fn add_secs(at: NaiveDateTime, secs: f64) -> NaiveDateTime {
    let saturated = if secs < 0.0 {
        NaiveDateTime::MIN
    } else {
        NaiveDateTime::MAX
    };
    // float-to-int `as` saturates, NaN becomes 0
    Duration::try_milliseconds((secs * 1000.0) as i64)
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(saturated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(t0());
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), t0() + Duration::seconds(90));
    }

    #[test]
    fn test_elapsed_never_negative() {
        let later = t0() + Duration::seconds(30);
        assert_eq!(elapsed_secs(later, t0()), 0.0);
        assert!((elapsed_secs(t0(), later) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_secs_saturates() {
        assert_eq!(add_secs(t0(), 90.5), t0() + Duration::milliseconds(90_500));
        assert_eq!(add_secs(t0(), 1e15), NaiveDateTime::MAX);
        assert_eq!(add_secs(t0(), f64::INFINITY), NaiveDateTime::MAX);
        assert_eq!(add_secs(t0(), -1e15), NaiveDateTime::MIN);
    }
}
