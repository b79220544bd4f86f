//! ProbabilityCompositor — folds the reply factors into one probability.
//!
//! `final = clamp(base × attentionFactor × emotionFactor × timeFactor
//!                + spillover + proactiveBoost − fatigue, hardMin, hardMax)`
//!
//! Bypassed evaluations never reach the compositor.

use cadence_core::config::{HardLimits, ReplyConfig};

/// Everything one reply decision is composed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityInputs {
    pub base: f64,
    /// `None` when the user has no profile (factor 1).
    pub attention: Option<f64>,
    pub emotion: Option<f64>,
    pub time_factor: f64,
    pub spillover: f64,
    pub proactive_boost: f64,
    pub fatigue_penalty: f64,
}

impl ProbabilityInputs {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            attention: None,
            emotion: None,
            time_factor: 1.0,
            spillover: 0.0,
            proactive_boost: 0.0,
            fatigue_penalty: 0.0,
        }
    }
}

/// Itemised record of how a probability came about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorTrace {
    pub base: f64,
    pub attention_score: Option<f64>,
    pub attention_factor: f64,
    pub emotion_score: Option<f64>,
    pub emotion_factor: f64,
    pub time_factor: f64,
    pub spillover: f64,
    pub proactive_boost: f64,
    pub fatigue_penalty: f64,
    /// Before clamping.
    pub raw: f64,
    pub hard_min: f64,
    pub hard_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Composite {
    pub probability: f64,
    pub trace: FactorTrace,
}

pub struct ProbabilityCompositor {
    attention_weight: f64,
    emotion_weight: f64,
    limits: HardLimits,
}

impl ProbabilityCompositor {
    pub fn new(attention_weight: f64, emotion_weight: f64, limits: HardLimits) -> Self {
        Self {
            attention_weight,
            emotion_weight,
            limits,
        }
    }

    pub fn from_config(config: &ReplyConfig) -> Self {
        Self::new(config.attention_weight, config.emotion_weight, config.hard_limits)
    }

    pub fn compute(&self, inputs: &ProbabilityInputs) -> Composite {
        let attention_factor = inputs
            .attention
            .map_or(1.0, |a| 1.0 + a * self.attention_weight);
        let emotion_factor = inputs
            .emotion
            .map_or(1.0, |e| 1.0 + e * self.emotion_weight);

        let raw = inputs.base * attention_factor * emotion_factor * inputs.time_factor
            + inputs.spillover
            + inputs.proactive_boost
            - inputs.fatigue_penalty;

        let (hard_min, hard_max) = self.limits.bounds();
        let probability = if raw.is_nan() {
            hard_min
        } else {
            raw.clamp(hard_min, hard_max)
        };

        Composite {
            probability,
            trace: FactorTrace {
                base: inputs.base,
                attention_score: inputs.attention,
                attention_factor,
                emotion_score: inputs.emotion,
                emotion_factor,
                time_factor: inputs.time_factor,
                spillover: inputs.spillover,
                proactive_boost: inputs.proactive_boost,
                fatigue_penalty: inputs.fatigue_penalty,
                raw,
                hard_min,
                hard_max,
            },
        }
    }
}

/// One Bernoulli trial: engage iff `draw < probability`.
pub fn decide(probability: f64, draw: f64) -> bool {
    draw < probability
}

/// How an evaluation skipped the probability model, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Bypass {
    #[default]
    None,
    /// Skip probability, but a downstream judgment still decides.
    Judged,
    /// Skip probability and judgment.
    Direct,
}

/// Raw bypass conditions detected by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BypassSignals {
    /// The agent was mentioned by name or handle.
    pub mentioned: bool,
    /// An interaction event aimed at the agent (poke, reaction, ...).
    pub targeted_event: bool,
    /// A configured keyword appeared in the message.
    pub trigger_keyword: bool,
}

impl BypassSignals {
    /// Fixed precedence: mention, then targeted event, then keyword.
    pub fn resolve(self) -> Bypass {
        if self.mentioned || self.targeted_event {
            Bypass::Direct
        } else if self.trigger_keyword {
            Bypass::Judged
        } else {
            Bypass::None
        }
    }
}

impl From<BypassSignals> for Bypass {
    fn from(signals: BypassSignals) -> Self {
        signals.resolve()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngagementDecision {
    pub engage: bool,
    pub requires_judgment: bool,
    pub bypass: Bypass,
    /// Unset for bypassed evaluations.
    pub final_probability: Option<f64>,
    pub draw: Option<f64>,
    pub trace: Option<FactorTrace>,
}

impl EngagementDecision {
    pub fn bypassed(bypass: Bypass) -> Self {
        Self {
            engage: true,
            requires_judgment: bypass == Bypass::Judged,
            bypass,
            final_probability: None,
            draw: None,
            trace: None,
        }
    }

    pub fn drawn(composite: Composite, draw: f64) -> Self {
        Self {
            engage: decide(composite.probability, draw),
            requires_judgment: false,
            bypass: Bypass::None,
            final_probability: Some(composite.probability),
            draw: Some(draw),
            trace: Some(composite.trace),
        }
    }
}
