//! Property-based tests for cadence_limbic attention and mood state.
//!
//! Verifies that decayed reads are monotone in time, that scores stay within
//! their documented ranges under arbitrary event sequences, and that the
//! roster never exceeds its capacity.

use cadence_core::config::{AttentionConfig, MoodConfig};
use cadence_core::{ConversationId, KeywordClassifier, UserId};
use cadence_limbic::{half_life_decay, AttentionRoster, AttentionTracker, MessageContext, MoodEngine};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Event {
    Reply { user: u8, gap: u32 },
    NoReply { user: u8, gap: u32 },
    Sweep { gap: u32 },
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (0u8..16, 0u32..900).prop_map(|(user, gap)| Event::Reply { user, gap }),
        (0u8..16, 0u32..900).prop_map(|(user, gap)| Event::NoReply { user, gap }),
        (0u32..4000).prop_map(|gap| Event::Sweep { gap }),
    ]
}

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn user(n: u8) -> UserId {
    UserId::new(format!("u{n}"))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn decay_is_monotone(a in 0.0f64..10_000.0, b in 0.0f64..10_000.0, hl in 1.0f64..5_000.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(half_life_decay(hi, hl) <= half_life_decay(lo, hl));
        prop_assert!(half_life_decay(lo, hl) <= 1.0);
        prop_assert!(half_life_decay(hi, hl) >= 0.0);
    }

    #[test]
    fn roster_stays_bounded(events in prop::collection::vec(arb_event(), 1..120)) {
        let config = AttentionConfig::default();
        let cap = config.max_tracked_users;
        let tracker = AttentionTracker::with_classifier(config, Arc::new(KeywordClassifier::default()));
        let mut roster = AttentionRoster::new(ConversationId::from("c"));
        let mut now = t0();

        for event in events {
            match event {
                Event::Reply { user: u, gap } => {
                    now += Duration::seconds(gap as i64);
                    tracker.record_reply(&mut roster, &user(u), MessageContext { display_name: None, text: Some("哈哈 不开心") }, now);
                }
                Event::NoReply { user: u, gap } => {
                    now += Duration::seconds(gap as i64);
                    tracker.record_no_reply(&mut roster, &user(u), now);
                }
                Event::Sweep { gap } => {
                    now += Duration::seconds(gap as i64);
                    tracker.sweep(&mut roster, now);
                }
            }
            prop_assert!(roster.len() <= cap);
            for p in roster.profiles() {
                prop_assert!((0.0..=1.0).contains(&p.attention_score));
                prop_assert!((-1.0..=1.0).contains(&p.emotion_score));
                let eff = tracker.effective(p, now);
                prop_assert!((0.0..=1.0).contains(&eff.attention));
                prop_assert!((-1.0..=1.0).contains(&eff.emotion));
            }
        }
    }

    #[test]
    fn effective_attention_never_grows_without_events(gap_a in 0i64..5_000, gap_b in 0i64..5_000) {
        let tracker = AttentionTracker::new(AttentionConfig::default());
        let mut roster = AttentionRoster::new(ConversationId::from("c"));
        tracker.record_reply(&mut roster, &user(1), MessageContext::default(), t0());
        let p = roster.profile(&user(1)).unwrap();
        let (lo, hi) = if gap_a <= gap_b { (gap_a, gap_b) } else { (gap_b, gap_a) };
        let early = tracker.effective(p, t0() + Duration::seconds(lo));
        let late = tracker.effective(p, t0() + Duration::seconds(hi));
        prop_assert!(late.attention <= early.attention);
        prop_assert!(late.emotion.abs() <= early.emotion.abs());
    }

    #[test]
    fn mood_intensity_stays_in_unit_range(gaps in prop::collection::vec(0u32..2_000, 1..40)) {
        let engine = MoodEngine::with_classifier(MoodConfig::default(), Arc::new(KeywordClassifier::default()));
        let conv = ConversationId::from("c");
        let mut slot = None;
        let mut now = t0();
        for gap in gaps {
            now += Duration::seconds(gap as i64);
            let reading = engine.observe(&mut slot, &conv, "哈哈哈", now);
            prop_assert!((0.0..=1.0).contains(&reading.intensity));
        }
    }
}
