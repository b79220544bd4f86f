//! Quiet hours for proactive messages.
//!
//! Inside the window the factor is 0. Outside it ramps linearly: down from 1
//! to 0 over the transition before the window opens, and back up over the
//! transition after it closes.

use cadence_core::config::QuietHoursConfig;
use cadence_core::DayWindow;
use chrono::NaiveTime;

#[derive(Debug, Clone)]
pub struct QuietHours {
    window: DayWindow,
    transition_secs: f64,
}

impl QuietHours {
    pub fn new(window: DayWindow, transition_minutes: f64) -> Self {
        Self {
            window,
            transition_secs: transition_minutes.max(0.0) * 60.0,
        }
    }

    /// `None` when quiet hours are disabled.
    pub fn from_config(config: &QuietHoursConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(DayWindow::new(config.start, config.end), config.transition_minutes))
    }

    pub fn factor_at(&self, t: NaiveTime) -> f64 {
        if self.window.contains(t) {
            return 0.0;
        }
        if self.transition_secs <= 0.0 {
            return 1.0;
        }
        let ramp = |secs: f64| (secs / self.transition_secs).min(1.0);
        ramp(self.window.secs_until_start(t)).min(ramp(self.window.secs_since_end(t)))
    }
}
