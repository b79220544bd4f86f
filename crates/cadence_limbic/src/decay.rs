use cadence_core::elapsed_secs;
use chrono::NaiveDateTime;

/// Multiplier after `elapsed_secs` under exponential half-life decay.
///
/// Non-positive elapsed time (including a clock that went backwards) and a
/// non-positive half-life both leave the value untouched.
pub fn half_life_decay(elapsed_secs: f64, halflife_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || halflife_secs <= 0.0 {
        return 1.0;
    }
    0.5f64.powf(elapsed_secs / halflife_secs)
}

/// `value` anchored at `since`, read at `now`.
pub fn decayed(value: f64, since: NaiveDateTime, now: NaiveDateTime, halflife_secs: f64) -> f64 {
    value * half_life_decay(elapsed_secs(since, now), halflife_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halflife_points() {
        assert!((half_life_decay(300.0, 300.0) - 0.5).abs() < 1e-12);
        assert!((half_life_decay(600.0, 300.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_no_elapsed_time() {
        assert_eq!(half_life_decay(0.0, 300.0), 1.0);
        assert_eq!(half_life_decay(-5.0, 300.0), 1.0);
    }

    #[test]
    fn test_degenerate_halflife() {
        assert_eq!(half_life_decay(100.0, 0.0), 1.0);
    }
}
