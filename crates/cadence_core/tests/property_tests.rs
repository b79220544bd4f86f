//! Property-based tests for cadence_core time windows and classification.
//!
//! Verifies window membership agrees with boundary distances for arbitrary
//! (including midnight-wrapping) windows, and that the keyword classifier
//! never panics on arbitrary text.

use cadence_core::{ClockTime, DayWindow, KeywordClassifier, Classifier};
use chrono::NaiveTime;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_clock_time() -> impl Strategy<Value = ClockTime> {
    (0u8..24, 0u8..60).prop_map(|(h, m)| ClockTime::new(h, m).unwrap())
}

fn arb_window() -> impl Strategy<Value = DayWindow> {
    (arb_clock_time(), arb_clock_time()).prop_map(|(s, e)| DayWindow::new(s, e))
}

fn arb_time() -> impl Strategy<Value = NaiveTime> {
    (0u32..86_400).prop_map(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0).unwrap())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn clock_time_display_round_trips(t in arb_clock_time()) {
        prop_assert_eq!(ClockTime::parse(&t.to_string()).unwrap(), t);
    }

    #[test]
    fn edge_distance_only_inside(w in arb_window(), t in arb_time()) {
        match w.edge_distance_secs(t) {
            Some(d) => {
                prop_assert!(w.contains(t));
                prop_assert!(d >= 0.0);
                prop_assert!(d <= w.length_secs() / 2.0 + 1e-9);
            }
            None => prop_assert!(!w.contains(t)),
        }
    }

    #[test]
    fn window_length_is_within_a_day(w in arb_window()) {
        let len = w.length_secs();
        prop_assert!(len > 0.0 && len <= 86_400.0);
    }

    #[test]
    fn classifier_never_panics(text in "\\PC{0,40}") {
        let c = KeywordClassifier::default();
        let out = c.classify(&text);
        prop_assert!(out.delta >= -1.0 && out.delta <= 1.0);
    }
}
