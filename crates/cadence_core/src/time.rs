//! Time-of-day values and daily windows.

use crate::error::ConfigError;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECS_PER_DAY: f64 = 86_400.0;

/// Wall-clock time of day, minute resolution, written `HH:MM`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ConfigError> {
        if hour > 23 || minute > 59 {
            return Err(ConfigError::MalformedTime {
                value: format!("{hour}:{minute}"),
            });
        }
        Ok(Self {
            minutes: hour as u16 * 60 + minute as u16,
        })
    }

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedTime {
            value: value.to_string(),
        };
        let (h, m) = value.trim().split_once(':').ok_or_else(malformed)?;
        // `u8::from_str` would accept a leading `+`
        let field = |part: &str| -> Result<u8, ConfigError> {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            part.parse().map_err(|_| malformed())
        };
        Self::new(field(h)?, field(m)?).map_err(|_| malformed())
    }

    pub fn hour(self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.minutes % 60) as u8
    }

    fn secs_from_midnight(self) -> f64 {
        self.minutes as f64 * 60.0
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClockTime> for String {
    fn from(t: ClockTime) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

fn secs_of(t: NaiveTime) -> f64 {
    t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9
}

fn wrap(secs: f64) -> f64 {
    secs.rem_euclid(SECS_PER_DAY)
}

/// Daily window `[start, end)`. `start > end` wraps midnight; `start == end`
/// covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl DayWindow {
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    pub fn length_secs(&self) -> f64 {
        let len = wrap(self.end.secs_from_midnight() - self.start.secs_from_midnight());
        if len == 0.0 {
            SECS_PER_DAY
        } else {
            len
        }
    }

    fn offset_secs(&self, t: NaiveTime) -> f64 {
        wrap(secs_of(t) - self.start.secs_from_midnight())
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        self.offset_secs(t) < self.length_secs()
    }

    /// Distance in seconds to the nearer boundary, if `t` is inside.
    pub fn edge_distance_secs(&self, t: NaiveTime) -> Option<f64> {
        if !self.contains(t) {
            return None;
        }
        let offset = self.offset_secs(t);
        Some(offset.min(self.length_secs() - offset))
    }

    /// Seconds until the window next opens. 0 at the start instant.
    pub fn secs_until_start(&self, t: NaiveTime) -> f64 {
        wrap(self.start.secs_from_midnight() - secs_of(t))
    }

    /// Seconds since the window last closed.
    pub fn secs_since_end(&self, t: NaiveTime) -> f64 {
        wrap(secs_of(t) - self.end.secs_from_midnight())
    }
}

impl fmt::Display for DayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: &str, end: &str) -> DayWindow {
        DayWindow::new(ClockTime::parse(start).unwrap(), ClockTime::parse(end).unwrap())
    }

    #[test]
    fn test_parse_valid_times() {
        let t = ClockTime::parse("07:05").unwrap();
        assert_eq!((t.hour(), t.minute()), (7, 5));
        assert_eq!(t.to_string(), "07:05");
        assert_eq!(ClockTime::parse("23:59").unwrap().to_string(), "23:59");
        assert_eq!(ClockTime::parse("7:05").unwrap(), t);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "24:00", "12:60", "noon", "12", "-1:30", "", "+7:05", "07:+5", "7 :05", "007:05",
        ] {
            assert!(
                matches!(ClockTime::parse(bad), Err(ConfigError::MalformedTime { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_plain_window_contains() {
        let w = window("09:00", "17:00");
        assert!(w.contains(at(9, 0)));
        assert!(w.contains(at(16, 59)));
        assert!(!w.contains(at(17, 0)));
        assert!(!w.contains(at(8, 59)));
    }

    #[test]
    fn test_overnight_window_contains() {
        let w = window("22:00", "06:00");
        assert!(w.contains(at(23, 30)));
        assert!(w.contains(at(0, 0)));
        assert!(w.contains(at(5, 59)));
        assert!(!w.contains(at(6, 0)));
        assert!(!w.contains(at(12, 0)));
        assert_eq!(w.length_secs(), 8.0 * 3600.0);
    }

    #[test]
    fn test_equal_bounds_cover_whole_day() {
        let w = window("08:00", "08:00");
        assert!(w.contains(at(3, 0)));
        assert!(w.contains(at(8, 0)));
        assert_eq!(w.length_secs(), SECS_PER_DAY);
    }

    #[test]
    fn test_edge_distance_across_midnight() {
        let w = window("22:00", "06:00");
        assert_eq!(w.edge_distance_secs(at(22, 10)), Some(600.0));
        assert_eq!(w.edge_distance_secs(at(5, 30)), Some(1800.0));
        assert_eq!(w.edge_distance_secs(at(12, 0)), None);
    }

    #[test]
    fn test_distance_outside_window() {
        let w = window("23:00", "07:00");
        assert_eq!(w.secs_until_start(at(22, 45)), 900.0);
        assert_eq!(w.secs_since_end(at(7, 20)), 1200.0);
    }

    #[test]
    fn test_serde_as_string() {
        let t: ClockTime = serde_json::from_str("\"18:30\"").unwrap();
        assert_eq!(t, ClockTime::new(18, 30).unwrap());
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"18:30\"");
        assert!(serde_json::from_str::<ClockTime>("\"25:00\"").is_err());
    }
}
