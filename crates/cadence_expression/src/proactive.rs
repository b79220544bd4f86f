//! ProactiveScheduler — deciding when the agent speaks first.
//!
//! The scheduler is a per-conversation state machine driven by `tick(now)`:
//!
//! ```text
//! Idle ──tick──▶ (suppressed | not drawn) ──▶ Idle
//!   │
//!   └─draw hits─▶ Triggered ──send ok──▶ AwaitingOutcome ──engaged──▶ Idle
//!                     │                        │
//!                 send failed              ignored / window elapsed
//!                     ▼                        ▼
//!                   Idle             failure ──budget spent──▶ Cooldown ──▶ Idle
//! ```
//!
//! Nothing is ever sent from here: a hit produces a [`TriggerIntent`] and
//! the caller reports back what actually happened.

use cadence_core::config::{EscalationConfig, ProactiveConfig, ScoreConfig};
use cadence_core::{add_secs, elapsed_secs, ConversationId, Draw, InvalidStateTransition, UserId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::quiet::QuietHours;
use crate::score::{
    perturbed_failure_budget, AdaptiveParameters, EscalationTier, InteractionScoreController,
    ScoreBand, ScoreState,
};
use crate::time_period::TimePeriodModulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProactivePhase {
    #[default]
    Idle,
    /// An intent was emitted and the caller has not confirmed the send.
    Triggered,
    /// The message went out; waiting for the engagement outcome.
    AwaitingOutcome,
    Cooldown,
}

impl fmt::Display for ProactivePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProactivePhase::Idle => "idle",
            ProactivePhase::Triggered => "triggered",
            ProactivePhase::AwaitingOutcome => "awaiting outcome",
            ProactivePhase::Cooldown => "cooldown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProactiveState {
    pub conversation_id: ConversationId,
    pub phase: ProactivePhase,
    pub last_check_at: Option<NaiveDateTime>,
    pub cooldown_until: Option<NaiveDateTime>,
    /// End of the outcome window opened by the last confirmed send.
    pub temp_boost_until: Option<NaiveDateTime>,
    pub proactive_active: bool,
    pub outcome_recorded: bool,
    pub intent_issued_at: Option<NaiveDateTime>,
    pub sent_at: Option<NaiveDateTime>,
    /// Users who spoke inside the current outcome window.
    pub responders: BTreeSet<UserId>,
    pub first_response_at: Option<NaiveDateTime>,
    /// Silence is measured from here: the last agent message or failed draw.
    pub silence_anchor_at: Option<NaiveDateTime>,
    /// User messages since the agent last spoke.
    pub user_message_times: VecDeque<NaiveDateTime>,
    /// Failure budget of the current attempt round, once drawn.
    pub failure_budget: Option<u32>,
    pub score: ScoreState,
}

impl ProactiveState {
    pub fn new(conversation_id: ConversationId, score: ScoreState) -> Self {
        Self {
            conversation_id,
            phase: ProactivePhase::Idle,
            last_check_at: None,
            cooldown_until: None,
            temp_boost_until: None,
            proactive_active: false,
            outcome_recorded: false,
            intent_issued_at: None,
            sent_at: None,
            responders: BTreeSet::new(),
            first_response_at: None,
            silence_anchor_at: None,
            user_message_times: VecDeque::new(),
            failure_budget: None,
            score,
        }
    }

    pub fn interaction_score(&self) -> f64 {
        self.score.score
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.score.consecutive_failures
    }

    pub fn total_failures(&self) -> u32 {
        self.score.total_failures
    }

    pub fn is_boost_window_open(&self, now: NaiveDateTime) -> bool {
        self.temp_boost_until.is_some_and(|until| now < until)
    }

    /// Drop in-flight lifecycle state, keeping score and history.
    pub fn clear_transient(&mut self) {
        self.phase = ProactivePhase::Idle;
        self.cooldown_until = None;
        self.temp_boost_until = None;
        self.proactive_active = false;
        self.outcome_recorded = false;
        self.intent_issued_at = None;
        self.responders.clear();
        self.first_response_at = None;
        self.failure_budget = None;
    }

    fn invalid(&self, operation: &'static str) -> InvalidStateTransition {
        InvalidStateTransition {
            operation,
            phase: self.phase.to_string(),
        }
    }
}

/// Request for the caller to produce and send a proactive message.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerIntent {
    pub conversation_id: ConversationId,
    pub probability: f64,
    pub interaction_score: f64,
    pub band: ScoreBand,
    pub escalation: EscalationTier,
    pub issued_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuppressReason {
    Disabled,
    Cooldown { until: NaiveDateTime },
    IntentPending,
    OutcomePending { until: NaiveDateTime },
    Silence { elapsed_secs: f64, required_secs: f64 },
    UserActivity { seen: usize, required: usize },
    QuietHours,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub consecutive_failures: u32,
    pub budget: u32,
    pub cooldown_until: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeReport {
    Success { gained: f64, score: f64 },
    Failure(FailureReport),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Suppressed(SuppressReason),
    /// The outcome window closed without a confirmation.
    Expired(FailureReport),
    NotDrawn { probability: f64, draw: f64 },
    Triggered(TriggerIntent),
}

impl TickOutcome {
    pub fn intent(self) -> Option<TriggerIntent> {
        match self {
            TickOutcome::Triggered(intent) => Some(intent),
            _ => None,
        }
    }
}

pub struct ProactiveScheduler {
    config: ProactiveConfig,
    controller: InteractionScoreController,
    modulator: TimePeriodModulator,
    quiet: Option<QuietHours>,
}

impl ProactiveScheduler {
    pub fn new(config: ProactiveConfig, score: ScoreConfig, escalation: EscalationConfig) -> Self {
        Self {
            controller: InteractionScoreController::new(score, escalation, &config),
            modulator: TimePeriodModulator::new(config.time_periods.clone()),
            quiet: QuietHours::from_config(&config.quiet_hours),
            config,
        }
    }

    pub fn config(&self) -> &ProactiveConfig {
        &self.config
    }

    pub fn controller(&self) -> &InteractionScoreController {
        &self.controller
    }

    pub fn new_state(&self, conversation_id: ConversationId) -> ProactiveState {
        ProactiveState::new(conversation_id, self.controller.initial_state())
    }

    pub fn adaptive_parameters(&self, state: &ProactiveState) -> AdaptiveParameters {
        self.controller.derive_adaptive_parameters(state.score.score)
    }

    pub fn escalation_tier(&self, state: &ProactiveState) -> EscalationTier {
        self.controller.escalation_tier(&state.score)
    }

    /// A user message arrived in the conversation.
    pub fn observe_user_message(&self, state: &mut ProactiveState, user: &UserId, now: NaiveDateTime) {
        self.prune_user_messages(state, now);
        state.user_message_times.push_back(now);
        if state.phase == ProactivePhase::AwaitingOutcome && state.is_boost_window_open(now) {
            if state.responders.insert(user.clone()) {
                tracing::debug!(
                    "Proactive window in {}: {} responded ({} so far)",
                    state.conversation_id,
                    user,
                    state.responders.len()
                );
            }
            state.first_response_at.get_or_insert(now);
        }
    }

    /// The agent said something in the conversation.
    pub fn observe_agent_message(&self, state: &mut ProactiveState, now: NaiveDateTime) {
        state.silence_anchor_at = Some(now);
        state.user_message_times.clear();
    }

    fn prune_user_messages(&self, state: &mut ProactiveState, now: NaiveDateTime) {
        let window = self.config.activity_window_secs;
        while state
            .user_message_times
            .front()
            .is_some_and(|t| elapsed_secs(*t, now) > window)
        {
            state.user_message_times.pop_front();
        }
    }

    pub fn tick(&self, state: &mut ProactiveState, now: NaiveDateTime, draw: &dyn Draw) -> TickOutcome {
        if !self.config.enabled {
            return TickOutcome::Suppressed(SuppressReason::Disabled);
        }
        state.last_check_at = Some(now);

        if let Some(until) = state.cooldown_until {
            if now < until {
                return TickOutcome::Suppressed(SuppressReason::Cooldown { until });
            }
            tracing::info!("Proactive cooldown over for {}", state.conversation_id);
            state.cooldown_until = None;
            state.score.consecutive_failures = 0;
            if state.phase == ProactivePhase::Cooldown {
                state.phase = ProactivePhase::Idle;
            }
        }

        match state.phase {
            ProactivePhase::Triggered => {
                let issued = state.intent_issued_at.unwrap_or(now);
                if elapsed_secs(issued, now) < self.config.intent_timeout_secs {
                    return TickOutcome::Suppressed(SuppressReason::IntentPending);
                }
                tracing::warn!(
                    "Proactive intent for {} was never acknowledged, abandoning",
                    state.conversation_id
                );
                state.phase = ProactivePhase::Idle;
                state.intent_issued_at = None;
            }
            ProactivePhase::AwaitingOutcome => {
                if let Some(until) = state.temp_boost_until.filter(|u| now < *u) {
                    return TickOutcome::Suppressed(SuppressReason::OutcomePending { until });
                }
                tracing::info!(
                    "Proactive window in {} closed without engagement ({} responder(s))",
                    state.conversation_id,
                    state.responders.len()
                );
                return TickOutcome::Expired(self.fail(state, now, draw));
            }
            ProactivePhase::Cooldown => {
                // cooldown without a deadline: treat as elapsed
                state.phase = ProactivePhase::Idle;
            }
            ProactivePhase::Idle => {}
        }

        self.controller.apply_time_decay(&mut state.score, now);
        self.controller.apply_escalation_decay(&mut state.score, now);
        let params = self.adaptive_parameters(state);

        if let Some(anchor) = state.silence_anchor_at {
            let silent_for = elapsed_secs(anchor, now);
            if silent_for < params.silence_threshold_secs {
                return TickOutcome::Suppressed(SuppressReason::Silence {
                    elapsed_secs: silent_for,
                    required_secs: params.silence_threshold_secs,
                });
            }
        }

        if self.config.require_user_activity {
            self.prune_user_messages(state, now);
            let seen = state.user_message_times.len();
            if seen < self.config.min_user_messages {
                return TickOutcome::Suppressed(SuppressReason::UserActivity {
                    seen,
                    required: self.config.min_user_messages,
                });
            }
        }

        let quiet = self.quiet.as_ref().map_or(1.0, |q| q.factor_at(now.time()));
        if quiet <= 0.0 {
            return TickOutcome::Suppressed(SuppressReason::QuietHours);
        }

        let time = self.modulator.factor_at(now);
        let (lo, hi) = self.config.hard_limits.bounds();
        let probability = (params.probability * quiet * time.factor).clamp(lo, hi);

        let roll = draw.draw();
        if roll >= probability {
            if self.config.reset_silence_on_failed_draw {
                state.silence_anchor_at = Some(now);
            }
            tracing::debug!(
                "Proactive draw missed in {}: {:.3} >= {:.3}",
                state.conversation_id,
                roll,
                probability
            );
            return TickOutcome::NotDrawn {
                probability,
                draw: roll,
            };
        }

        state.phase = ProactivePhase::Triggered;
        state.intent_issued_at = Some(now);
        let intent = TriggerIntent {
            conversation_id: state.conversation_id.clone(),
            probability,
            interaction_score: state.score.score,
            band: params.band,
            escalation: self.escalation_tier(state),
            issued_at: now,
        };
        tracing::info!(
            "Proactive trigger for {} (p={:.3}, score={:.1}, {:?})",
            intent.conversation_id,
            probability,
            intent.interaction_score,
            intent.band
        );
        TickOutcome::Triggered(intent)
    }

    /// The caller tried to deliver the intended message.
    pub fn report_send(
        &self,
        state: &mut ProactiveState,
        ok: bool,
        now: NaiveDateTime,
    ) -> Result<(), InvalidStateTransition> {
        if state.phase != ProactivePhase::Triggered {
            return Err(state.invalid("report_send"));
        }
        state.intent_issued_at = None;
        if !ok {
            tracing::warn!("Proactive send failed for {}", state.conversation_id);
            state.phase = ProactivePhase::Idle;
            return Ok(());
        }
        state.phase = ProactivePhase::AwaitingOutcome;
        state.proactive_active = true;
        state.outcome_recorded = false;
        state.sent_at = Some(now);
        state.temp_boost_until = Some(add_secs(now, self.config.temp_boost_secs));
        state.responders.clear();
        state.first_response_at = None;
        self.observe_agent_message(state, now);
        Ok(())
    }

    /// Explicit confirmation of whether the proactive message landed.
    /// Latency and responder count default to what the window observed.
    /// Engagement only counts while the outcome window is open; a report at
    /// or after its end is recorded as a failure.
    pub fn report_outcome(
        &self,
        state: &mut ProactiveState,
        engaged: bool,
        latency_secs: Option<f64>,
        responders: Option<u32>,
        now: NaiveDateTime,
        draw: &dyn Draw,
    ) -> Result<OutcomeReport, InvalidStateTransition> {
        if state.phase != ProactivePhase::AwaitingOutcome || state.outcome_recorded {
            return Err(state.invalid("report_outcome"));
        }
        if state.temp_boost_until.is_some_and(|until| now >= until) {
            tracing::info!(
                "Outcome for {} reported after its window closed, counting a failure",
                state.conversation_id
            );
            return Ok(OutcomeReport::Failure(self.fail(state, now, draw)));
        }
        if !engaged {
            return Ok(OutcomeReport::Failure(self.fail(state, now, draw)));
        }

        let latency = latency_secs.or_else(|| match (state.sent_at, state.first_response_at) {
            (Some(sent), Some(first)) => Some(elapsed_secs(sent, first)),
            _ => None,
        });
        let responders = responders.unwrap_or(state.responders.len() as u32);
        let gained = self
            .controller
            .record_success(&mut state.score, now, latency, responders);

        state.outcome_recorded = true;
        state.proactive_active = false;
        state.phase = ProactivePhase::Idle;
        state.failure_budget = None;
        Ok(OutcomeReport::Success {
            gained,
            score: state.score.score,
        })
    }

    fn fail(&self, state: &mut ProactiveState, now: NaiveDateTime, draw: &dyn Draw) -> FailureReport {
        self.controller.record_failure(&mut state.score, now);
        state.outcome_recorded = true;
        state.proactive_active = false;

        let params = self.adaptive_parameters(state);
        let perturbation = self.config.failure_budget_perturbation;
        let budget = *state.failure_budget.get_or_insert_with(|| {
            if perturbation > 0.0 {
                perturbed_failure_budget(params.max_consecutive_failures, perturbation, draw.draw())
            } else {
                params.max_consecutive_failures
            }
        });

        let cooldown_until = if state.score.consecutive_failures >= budget {
            let until = add_secs(now, params.cooldown_secs);
            state.phase = ProactivePhase::Cooldown;
            state.cooldown_until = Some(until);
            state.failure_budget = None;
            tracing::info!(
                "Proactive cooldown for {} until {} after {} failure(s)",
                state.conversation_id,
                until,
                state.score.consecutive_failures
            );
            Some(until)
        } else {
            state.phase = ProactivePhase::Idle;
            None
        };

        FailureReport {
            consecutive_failures: state.score.consecutive_failures,
            budget,
            cooldown_until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{FixedDraw, ScriptedDraw};
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    fn at(s: i64) -> NaiveDateTime {
        t0() + Duration::seconds(s)
    }

    fn scheduler(config: ProactiveConfig) -> ProactiveScheduler {
        ProactiveScheduler::new(config, ScoreConfig::default(), EscalationConfig::default())
    }

    fn relaxed() -> ProactiveConfig {
        ProactiveConfig {
            require_user_activity: false,
            ..ProactiveConfig::default()
        }
    }

    fn state(s: &ProactiveScheduler) -> ProactiveState {
        s.new_state(ConversationId::from("group-1"))
    }

    fn trigger(s: &ProactiveScheduler, st: &mut ProactiveState, now: NaiveDateTime) -> TriggerIntent {
        s.tick(st, now, &FixedDraw(0.0)).intent().expect("should trigger")
    }

    #[test]
    fn test_fresh_conversation_triggers() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        let intent = trigger(&s, &mut st, t0());
        assert_eq!(st.phase, ProactivePhase::Triggered);
        assert!((intent.probability - 0.3).abs() < 1e-9);
        assert_eq!(intent.band, ScoreBand::Baseline);
    }

    #[test]
    fn test_subdued_silence_threshold_blocks() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        st.score.score = 25.0;
        st.silence_anchor_at = Some(at(-800));
        match s.tick(&mut st, t0(), &FixedDraw(0.0)) {
            TickOutcome::Suppressed(SuppressReason::Silence { required_secs, .. }) => {
                assert_eq!(required_secs, 900.0)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(st.phase, ProactivePhase::Idle);
    }

    #[test]
    fn test_requires_recent_user_messages() {
        let s = scheduler(ProactiveConfig::default());
        let mut st = state(&s);
        let user = UserId::from("u");
        s.observe_user_message(&mut st, &user, at(-400));
        s.observe_user_message(&mut st, &user, at(-100));
        s.observe_user_message(&mut st, &user, at(-50));
        assert!(matches!(
            s.tick(&mut st, t0(), &FixedDraw(0.0)),
            TickOutcome::Suppressed(SuppressReason::UserActivity { seen: 2, required: 3 })
        ));
        s.observe_user_message(&mut st, &user, at(-10));
        assert!(s.tick(&mut st, t0(), &FixedDraw(0.0)).intent().is_some());
    }

    #[test]
    fn test_failed_draw_resets_silence() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        assert!(matches!(
            s.tick(&mut st, t0(), &FixedDraw(0.99)),
            TickOutcome::NotDrawn { .. }
        ));
        assert_eq!(st.silence_anchor_at, Some(t0()));
        assert!(matches!(
            s.tick(&mut st, at(60), &FixedDraw(0.0)),
            TickOutcome::Suppressed(SuppressReason::Silence { .. })
        ));
    }

    #[test]
    fn test_no_second_intent_while_pending() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        assert_eq!(
            s.tick(&mut st, at(10), &FixedDraw(0.0)),
            TickOutcome::Suppressed(SuppressReason::IntentPending)
        );
        // abandoned after the intent timeout
        assert!(s.tick(&mut st, at(200), &FixedDraw(0.0)).intent().is_some());
    }

    #[test]
    fn test_no_retrigger_during_outcome_window() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        assert!(st.proactive_active);
        for t in [1, 30, 119] {
            assert!(matches!(
                s.tick(&mut st, at(t), &FixedDraw(0.0)),
                TickOutcome::Suppressed(SuppressReason::OutcomePending { .. })
            ));
        }
    }

    #[test]
    fn test_failed_send_returns_to_idle() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, false, t0()).unwrap();
        assert_eq!(st.phase, ProactivePhase::Idle);
        assert_eq!(st.consecutive_failures(), 0);
        assert!(!st.proactive_active);
    }

    #[test]
    fn test_messages_during_window_do_not_finalise() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        s.observe_user_message(&mut st, &UserId::from("a"), at(5));
        s.observe_user_message(&mut st, &UserId::from("b"), at(8));
        assert_eq!(st.phase, ProactivePhase::AwaitingOutcome);
        assert!(!st.outcome_recorded);
        assert_eq!(st.responders.len(), 2);

        let report = s
            .report_outcome(&mut st, true, None, None, at(9), &FixedDraw(0.5))
            .unwrap();
        // base 15 + fast 5 + multi 10
        assert_eq!(
            report,
            OutcomeReport::Success {
                gained: 30.0,
                score: 80.0
            }
        );
        assert!(st.outcome_recorded);
        assert!(!st.proactive_active);
        assert_eq!(st.phase, ProactivePhase::Idle);
    }

    #[test]
    fn test_negative_outcome_with_responders_is_failure() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        s.observe_user_message(&mut st, &UserId::from("a"), at(5));
        let report = s
            .report_outcome(&mut st, false, None, Some(1), at(6), &FixedDraw(0.5))
            .unwrap();
        assert!(matches!(report, OutcomeReport::Failure(_)));
        assert_eq!(st.consecutive_failures(), 1);
        assert_eq!(st.interaction_score(), 42.0);
    }

    #[test]
    fn test_late_engagement_counts_as_failure() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        let report = s
            .report_outcome(&mut st, true, None, None, at(500), &FixedDraw(0.5))
            .unwrap();
        assert!(matches!(report, OutcomeReport::Failure(_)));
        assert_eq!(st.consecutive_failures(), 1);
        assert_eq!(st.interaction_score(), 42.0);
        assert!(st.outcome_recorded);
    }

    #[test]
    fn test_outcome_window_edges() {
        let s = scheduler(relaxed());

        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        assert_eq!(st.temp_boost_until, Some(at(120)));
        let report = s
            .report_outcome(&mut st, true, Some(3.0), Some(1), at(119), &FixedDraw(0.5))
            .unwrap();
        assert!(matches!(report, OutcomeReport::Success { .. }));

        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        let report = s
            .report_outcome(&mut st, true, Some(3.0), Some(1), at(120), &FixedDraw(0.5))
            .unwrap();
        assert!(matches!(report, OutcomeReport::Failure(_)));
        assert_eq!(st.consecutive_failures(), 1);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let mut config = relaxed();
        config.temp_boost_secs = 1e15;
        config.cooldown_secs = 1e15;
        config.max_consecutive_failures = 1;
        let s = scheduler(config);
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        assert_eq!(st.temp_boost_until, Some(NaiveDateTime::MAX));

        let report = s
            .report_outcome(&mut st, false, None, None, at(5), &FixedDraw(0.5))
            .unwrap();
        match report {
            OutcomeReport::Failure(r) => assert_eq!(r.cooldown_until, Some(NaiveDateTime::MAX)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(st.phase, ProactivePhase::Cooldown);
    }

    #[test]
    fn test_window_expiry_records_failure_then_cooldown() {
        let s = scheduler(relaxed());
        let mut st = state(&s);

        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        match s.tick(&mut st, at(121), &FixedDraw(0.0)) {
            TickOutcome::Expired(r) => {
                assert_eq!(r.consecutive_failures, 1);
                assert_eq!(r.cooldown_until, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(st.phase, ProactivePhase::Idle);

        let second = at(121 + 900);
        trigger(&s, &mut st, second);
        s.report_send(&mut st, true, second).unwrap();
        let closed = second + Duration::seconds(121);
        match s.tick(&mut st, closed, &FixedDraw(0.0)) {
            TickOutcome::Expired(r) => {
                assert_eq!(r.consecutive_failures, 2);
                assert!(r.cooldown_until.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(st.phase, ProactivePhase::Cooldown);

        // every tick inside the cooldown is suppressed, whatever the draw
        for m in [1, 10, 29] {
            assert!(matches!(
                s.tick(&mut st, closed + Duration::minutes(m), &FixedDraw(0.0)),
                TickOutcome::Suppressed(SuppressReason::Cooldown { .. })
            ));
        }
    }

    #[test]
    fn test_cooldown_expires_back_to_idle() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        st.phase = ProactivePhase::Cooldown;
        st.cooldown_until = Some(at(100));
        st.score.consecutive_failures = 2;
        assert!(s.tick(&mut st, at(101), &FixedDraw(0.0)).intent().is_some());
        assert_eq!(st.consecutive_failures(), 0);
    }

    #[test]
    fn test_outcome_without_pending_send_is_rejected() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        let err = s
            .report_outcome(&mut st, true, None, None, t0(), &FixedDraw(0.5))
            .unwrap_err();
        assert_eq!(err.operation, "report_outcome");
        assert!(s.report_send(&mut st, true, t0()).is_err());
    }

    #[test]
    fn test_double_outcome_is_rejected() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        s.report_outcome(&mut st, true, Some(3.0), Some(1), at(3), &FixedDraw(0.5))
            .unwrap();
        assert!(s
            .report_outcome(&mut st, true, Some(3.0), Some(1), at(4), &FixedDraw(0.5))
            .is_err());
    }

    #[test]
    fn test_quiet_hours_suppress() {
        let mut config = relaxed();
        config.quiet_hours.enabled = true;
        let s = scheduler(config);
        let mut st = state(&s);
        let night = NaiveDate::from_ymd_opt(2024, 6, 2)
            .unwrap()
            .and_hms_opt(2, 0, 0)
            .unwrap();
        assert_eq!(
            s.tick(&mut st, night, &FixedDraw(0.0)),
            TickOutcome::Suppressed(SuppressReason::QuietHours)
        );
    }

    #[test]
    fn test_quiet_taper_scales_probability() {
        let mut config = relaxed();
        config.quiet_hours.enabled = true;
        let s = scheduler(config);
        let mut st = state(&s);
        let dusk = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(22, 45, 0)
            .unwrap();
        let intent = trigger(&s, &mut st, dusk);
        assert!((intent.probability - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_probability_respects_hard_max() {
        let mut config = relaxed();
        config.base_probability = 1.0;
        let s = scheduler(config);
        let mut st = state(&s);
        st.score.score = 95.0;
        let intent = trigger(&s, &mut st, t0());
        assert_eq!(intent.probability, 0.9);
    }

    #[test]
    fn test_perturbed_budget_drawn_once_per_round() {
        let mut config = relaxed();
        config.failure_budget_perturbation = 1.0;
        let s = scheduler(config);
        let mut st = state(&s);
        // first draw triggers, second is the budget draw
        let draw = ScriptedDraw::new([0.0, 0.0], 0.0);
        assert!(s.tick(&mut st, t0(), &draw).intent().is_some());
        s.report_send(&mut st, true, t0()).unwrap();
        let report = s
            .report_outcome(&mut st, false, None, None, at(5), &draw)
            .unwrap();
        match report {
            OutcomeReport::Failure(r) => assert_eq!(r.budget, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(st.failure_budget, Some(2));
    }

    #[test]
    fn test_clear_transient_keeps_score() {
        let s = scheduler(relaxed());
        let mut st = state(&s);
        trigger(&s, &mut st, t0());
        s.report_send(&mut st, true, t0()).unwrap();
        st.score.score = 61.0;
        st.clear_transient();
        assert_eq!(st.phase, ProactivePhase::Idle);
        assert!(!st.proactive_active);
        assert_eq!(st.interaction_score(), 61.0);
    }
}
