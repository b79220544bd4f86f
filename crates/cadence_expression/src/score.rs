//! InteractionScoreController — feedback from proactive outcomes.
//!
//! Every confirmed engagement raises the conversation's interaction score,
//! every ignored proactive message lowers it. The score then selects a band
//! whose multipliers stretch or shrink the proactive parameters: a lively
//! conversation hears from the agent sooner and more often, a cold one is
//! left alone for longer.

use cadence_core::config::{BandMultipliers, EscalationConfig, ProactiveConfig, ScoreConfig};
use cadence_core::{add_secs, elapsed_secs};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreState {
    pub score: f64,
    pub consecutive_failures: u32,
    pub total_failures: u32,
    #[serde(default)]
    pub consecutive_successes: u32,
    #[serde(default)]
    pub successes: u64,
    #[serde(default)]
    pub failures: u64,
    pub last_activity_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_decay_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_failure_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_escalation_decay_at: Option<NaiveDateTime>,
}

impl ScoreState {
    pub fn new(initial: f64) -> Self {
        Self {
            score: initial,
            consecutive_failures: 0,
            total_failures: 0,
            consecutive_successes: 0,
            successes: 0,
            failures: 0,
            last_activity_at: None,
            last_decay_at: None,
            last_failure_at: None,
            last_escalation_decay_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBand {
    Energetic,
    Baseline,
    Tapering,
    Subdued,
    Dormant,
}

/// Coarse label for logs and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreLevel {
    Fervent,
    Friendly,
    Cool,
    Frosty,
    Silent,
}

impl ScoreLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => ScoreLevel::Fervent,
            s if s >= 60.0 => ScoreLevel::Friendly,
            s if s >= 40.0 => ScoreLevel::Cool,
            s if s >= 20.0 => ScoreLevel::Frosty,
            _ => ScoreLevel::Silent,
        }
    }
}

impl fmt::Display for ScoreLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScoreLevel::Fervent => "fervent",
            ScoreLevel::Friendly => "friendly",
            ScoreLevel::Cool => "cool",
            ScoreLevel::Frosty => "frosty",
            ScoreLevel::Silent => "silent",
        })
    }
}

/// How hard the agent should acknowledge being ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum EscalationTier {
    #[default]
    None,
    Mild,
    Clear,
    Severe,
}

pub fn escalation_tier(total_failures: u32, config: &EscalationConfig) -> EscalationTier {
    if total_failures >= config.severe_at {
        EscalationTier::Severe
    } else if total_failures >= config.clear_at {
        EscalationTier::Clear
    } else if total_failures >= config.mild_at {
        EscalationTier::Mild
    } else {
        EscalationTier::None
    }
}

/// Proactive parameters adapted to the current score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveParameters {
    pub band: ScoreBand,
    pub multipliers: BandMultipliers,
    pub silence_threshold_secs: f64,
    pub probability: f64,
    pub max_consecutive_failures: u32,
    pub cooldown_secs: f64,
}

pub struct InteractionScoreController {
    score: ScoreConfig,
    escalation: EscalationConfig,
    base_silence_secs: f64,
    base_probability: f64,
    base_max_failures: u32,
    base_cooldown_secs: f64,
}

impl InteractionScoreController {
    pub fn new(score: ScoreConfig, escalation: EscalationConfig, proactive: &ProactiveConfig) -> Self {
        Self {
            score,
            escalation,
            base_silence_secs: proactive.silence_threshold_secs,
            base_probability: proactive.base_probability,
            base_max_failures: proactive.max_consecutive_failures,
            base_cooldown_secs: proactive.cooldown_secs,
        }
    }

    pub fn initial_state(&self) -> ScoreState {
        ScoreState::new(self.score.initial)
    }

    pub fn escalation_config(&self) -> &EscalationConfig {
        &self.escalation
    }

    fn clamp(&self, score: f64) -> f64 {
        score.clamp(self.score.min, self.score.max)
    }

    /// A proactive message got a real response. Returns the points gained.
    pub fn record_success(
        &self,
        state: &mut ScoreState,
        now: NaiveDateTime,
        latency_secs: Option<f64>,
        responders: u32,
    ) -> f64 {
        let c = &self.score;
        state.consecutive_successes = state.consecutive_successes.saturating_add(1);

        let mut gain = c.success_base;
        if latency_secs.is_some_and(|l| l < c.fast_reply_secs) {
            gain += c.fast_reply_bonus;
        }
        if responders > 1 {
            gain += c.multi_user_bonus;
        }
        if state.consecutive_successes >= c.streak_length {
            gain += c.streak_bonus;
        }
        if state.score < c.recovery_threshold {
            gain += c.recovery_bonus;
        }

        let before = state.score;
        state.score = self.clamp(state.score + gain);
        state.consecutive_failures = 0;
        state.total_failures = state
            .total_failures
            .saturating_sub(self.escalation.decay_on_success);
        state.successes = state.successes.saturating_add(1);
        state.last_activity_at = Some(now);

        tracing::info!(
            "Interaction score {:.1} -> {:.1} ({}), +{:.0} for success",
            before,
            state.score,
            ScoreLevel::from_score(state.score),
            gain
        );
        state.score - before
    }

    /// A proactive message went unanswered.
    pub fn record_failure(&self, state: &mut ScoreState, now: NaiveDateTime) {
        let before = state.score;
        state.score = self.clamp(state.score - self.score.fail_penalty);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.total_failures = state.total_failures.saturating_add(1).min(self.escalation.cap);
        state.consecutive_successes = 0;
        state.failures = state.failures.saturating_add(1);
        state.last_activity_at = Some(now);
        state.last_failure_at = Some(now);

        tracing::info!(
            "Interaction score {:.1} -> {:.1} ({}), failure {} in a row, {} total",
            before,
            state.score,
            ScoreLevel::from_score(state.score),
            state.consecutive_failures,
            state.total_failures
        );
    }

    /// Flat decay per full idle day. Returns the points lost.
    pub fn apply_time_decay(&self, state: &mut ScoreState, now: NaiveDateTime) -> f64 {
        let anchor = match (state.last_activity_at, state.last_decay_at) {
            (Some(a), Some(d)) => a.max(d),
            (a, d) => match a.or(d) {
                Some(t) => t,
                None => {
                    state.last_decay_at = Some(now);
                    return 0.0;
                }
            },
        };
        let days = (elapsed_secs(anchor, now) / SECS_PER_DAY).floor();
        if days < 1.0 {
            return 0.0;
        }
        let before = state.score;
        state.score = self.clamp(state.score - self.score.daily_decay * days);
        state.last_decay_at = Some(anchor + Duration::days(days as i64));
        tracing::debug!(
            "Interaction score decayed {:.1} -> {:.1} after {} idle day(s)",
            before,
            state.score,
            days
        );
        before - state.score
    }

    /// Forgive old failures once proactive activity has been quiet long
    /// enough. Returns how many were forgiven.
    pub fn apply_escalation_decay(&self, state: &mut ScoreState, now: NaiveDateTime) -> u32 {
        let c = &self.escalation;
        let Some(last_failure) = state.last_failure_at else {
            return 0;
        };
        if state.total_failures == 0 || c.decay_amount == 0 {
            return 0;
        }
        let start = add_secs(last_failure, c.quiet_period_secs);
        let mut next_due = match state.last_escalation_decay_at {
            Some(at) if at >= start => add_secs(at, c.check_interval_secs),
            _ => start,
        };

        let before = state.total_failures;
        while now >= next_due && state.total_failures > 0 {
            state.total_failures = state.total_failures.saturating_sub(c.decay_amount);
            state.last_escalation_decay_at = Some(next_due);
            next_due = add_secs(next_due, c.check_interval_secs);
        }
        before - state.total_failures
    }

    pub fn band_for(&self, score: f64) -> (ScoreBand, BandMultipliers) {
        let b = &self.score.bands;
        if score > b.energetic_above {
            (ScoreBand::Energetic, b.energetic)
        } else if score >= b.baseline_above {
            (ScoreBand::Baseline, b.baseline)
        } else if score > b.tapering_above {
            let span = b.baseline_above - b.tapering_above;
            let t = if span > 0.0 {
                (b.baseline_above - score) / span
            } else {
                1.0
            };
            (ScoreBand::Tapering, b.baseline.lerp(&b.subdued, t))
        } else if score >= b.subdued_above {
            (ScoreBand::Subdued, b.subdued)
        } else {
            (ScoreBand::Dormant, b.dormant)
        }
    }

    pub fn derive_adaptive_parameters(&self, score: f64) -> AdaptiveParameters {
        let (band, m) = self.band_for(score);
        AdaptiveParameters {
            band,
            multipliers: m,
            silence_threshold_secs: self.base_silence_secs * m.silence_threshold,
            probability: self.base_probability * m.probability,
            max_consecutive_failures: ((self.base_max_failures as f64 * m.max_failures).round()
                as u32)
                .max(1),
            cooldown_secs: self.base_cooldown_secs * m.cooldown,
        }
    }

    pub fn escalation_tier(&self, state: &ScoreState) -> EscalationTier {
        escalation_tier(state.total_failures, &self.escalation)
    }
}

/// Randomised failure budget for one attempt round.
///
/// The shortfall ratio is drawn from Beta(1, 1 + 5p) by inverse CDF, so a
/// larger `p` keeps the ratio smaller and the budget closer to `budget`.
/// `p <= 0` disables the perturbation.
pub fn perturbed_failure_budget(budget: u32, p: f64, uniform: f64) -> u32 {
    if p <= 0.0 || budget <= 1 {
        return budget.max(1);
    }
    let b = 1.0 + 5.0 * p;
    let ratio = 1.0 - (1.0 - uniform.clamp(0.0, 1.0)).powf(1.0 / b);
    ((budget as f64 * (1.0 - ratio)).round() as u32).clamp(1, budget)
}
