//! Property-based tests for the engagement engine.
//!
//! Verifies that a reset conversation is indistinguishable from a brand-new
//! one whatever happened before, and that reply probabilities stay in [0, 1]
//! under arbitrary traffic.

use cadence_core::config::CadenceConfig;
use cadence_core::{ConversationId, FixedDraw, KeywordClassifier, ManualClock, UserId};
use cadence_engine::{EngagementEngine, InboundMessage};
use cadence_expression::Bypass;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Event {
    Message { user: u8, text: usize, gap: u32 },
    Reply { user: u8, gap: u32 },
    NoReply { user: u8, gap: u32 },
    Tick { gap: u32 },
    Send { ok: bool },
    Outcome { engaged: bool, gap: u32 },
}

const TEXTS: [&str; 4] = ["哈哈哈太好笑了", "好难过", "ok", "不开心"];

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (0u8..6, 0..TEXTS.len(), 0u32..600).prop_map(|(user, text, gap)| Event::Message {
            user,
            text,
            gap
        }),
        (0u8..6, 0u32..600).prop_map(|(user, gap)| Event::Reply { user, gap }),
        (0u8..6, 0u32..600).prop_map(|(user, gap)| Event::NoReply { user, gap }),
        (0u32..2_000).prop_map(|gap| Event::Tick { gap }),
        any::<bool>().prop_map(|ok| Event::Send { ok }),
        (any::<bool>(), 0u32..300).prop_map(|(engaged, gap)| Event::Outcome { engaged, gap }),
    ]
}

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn user(n: u8) -> UserId {
    UserId::new(format!("u{n}"))
}

fn engine(draw: f64) -> EngagementEngine {
    let mut config = CadenceConfig::default();
    config.proactive.require_user_activity = false;
    EngagementEngine::with_parts(
        config,
        Arc::new(ManualClock::new(t0())),
        Arc::new(FixedDraw(draw)),
        Some(Arc::new(KeywordClassifier::default())),
    )
}

/// Feed `events` into `conv`, returning the last instant used.
fn replay(engine: &EngagementEngine, conv: &ConversationId, events: &[Event]) -> NaiveDateTime {
    let mut now = t0();
    for event in events {
        match event {
            Event::Message { user: u, text, gap } => {
                now += Duration::seconds(*gap as i64);
                let id = user(*u);
                engine.observe_message(conv, InboundMessage::new(&id, TEXTS[*text]), now);
            }
            Event::Reply { user: u, gap } => {
                now += Duration::seconds(*gap as i64);
                engine.on_attention_event(conv, &user(*u), true, now);
            }
            Event::NoReply { user: u, gap } => {
                now += Duration::seconds(*gap as i64);
                engine.on_attention_event(conv, &user(*u), false, now);
            }
            Event::Tick { gap } => {
                now += Duration::seconds(*gap as i64);
                engine.tick(conv, now);
            }
            Event::Send { ok } => {
                engine.report_proactive_send(conv, *ok, now);
            }
            Event::Outcome { engaged, gap } => {
                now += Duration::seconds(*gap as i64);
                engine.report_proactive_outcome(conv, *engaged, None, None, now);
            }
        }
    }
    now
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn reset_matches_fresh_conversation(
        events in prop::collection::vec(arb_event(), 1..60),
        draw in 0.0f64..1.0,
        probe_user in 0u8..6,
    ) {
        let engine = engine(draw);
        let dirty = ConversationId::from("dirty");
        let fresh = ConversationId::from("fresh");
        let end = replay(&engine, &dirty, &events);
        engine.reset_conversation(&dirty);

        let now = end + Duration::seconds(1);
        let who = user(probe_user);
        let a = engine.evaluate_reply(&dirty, &who, now, Bypass::None);
        let b = engine.evaluate_reply(&fresh, &who, now, Bypass::None);
        prop_assert_eq!(a, b);
        prop_assert_eq!(engine.mood(&dirty, now), engine.mood(&fresh, now));

        let mut reset = engine.proactive_state(&dirty).unwrap();
        reset.conversation_id = fresh.clone();
        prop_assert_eq!(Some(reset), engine.proactive_state(&fresh));
    }

    #[test]
    fn reply_probability_stays_in_unit_range(
        events in prop::collection::vec(arb_event(), 1..60),
        probe_user in 0u8..6,
    ) {
        let engine = engine(0.5);
        let conv = ConversationId::from("c");
        let end = replay(&engine, &conv, &events);
        let d = engine.evaluate_reply(&conv, &user(probe_user), end, Bypass::None);
        let p = d.final_probability.unwrap();
        prop_assert!((0.0..=1.0).contains(&p));
        prop_assert_eq!(d.engage, 0.5 < p);
    }
}
