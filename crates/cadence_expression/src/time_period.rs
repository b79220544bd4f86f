//! Time-of-day modulation.
//!
//! Windows are checked in declared order and the first one containing the
//! instant wins. Near either edge of the matched window the factor eases
//! from 1.0 at the boundary to the window's own factor, so crossing into a
//! window never jumps.

use cadence_core::config::{EasingCurve, TimePeriodConfig, TimePeriodRule};
use cadence_core::DayWindow;
use chrono::{NaiveDateTime, NaiveTime};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub struct TimeFactor {
    pub factor: f64,
    /// Name of the matched window, if any.
    pub window: Option<String>,
    pub in_transition: bool,
}

impl TimeFactor {
    fn neutral() -> Self {
        Self {
            factor: 1.0,
            window: None,
            in_transition: false,
        }
    }
}

/// Map linear progress in [0, 1] onto the easing curve.
pub fn ease(progress: f64, curve: EasingCurve) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    match curve {
        EasingCurve::Sine => (1.0 - (PI * p).cos()) / 2.0,
        EasingCurve::Cubic => p * p * (3.0 - 2.0 * p),
    }
}

pub struct TimePeriodModulator {
    config: TimePeriodConfig,
}

impl TimePeriodModulator {
    pub fn new(config: TimePeriodConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimePeriodConfig {
        &self.config
    }

    pub fn factor_at(&self, now: NaiveDateTime) -> TimeFactor {
        if !self.config.enabled {
            return TimeFactor::neutral();
        }
        self.factor_at_time(now.time())
    }

    pub fn factor_at_time(&self, t: NaiveTime) -> TimeFactor {
        let c = &self.config;
        let mut result = TimeFactor::neutral();

        if let Some((rule, edge)) = matching_window(&c.windows, t) {
            let transition = c.transition_minutes * 60.0;
            result.window = Some(rule.name.clone());
            result.factor = if transition > 0.0 && edge < transition {
                result.in_transition = true;
                let progress = edge / transition;
                let smooth = rule.smooth_curve.unwrap_or(c.use_smooth_curve);
                let eased = if smooth { ease(progress, c.curve) } else { progress };
                1.0 + (rule.factor - 1.0) * eased
            } else {
                rule.factor
            };
        }

        result.factor = result.factor.clamp(c.min_factor, c.max_factor);
        result
    }
}

/// First rule containing `t`, with the distance to its nearer edge.
fn matching_window(rules: &[TimePeriodRule], t: NaiveTime) -> Option<(&TimePeriodRule, f64)> {
    rules.iter().find_map(|rule| {
        DayWindow::new(rule.start, rule.end)
            .edge_distance_secs(t)
            .map(|edge| (rule, edge))
    })
}
