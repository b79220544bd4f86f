pub mod probability;
pub mod proactive;
pub mod quiet;
pub mod score;
pub mod time_period;

pub use probability::{
    decide, Bypass, BypassSignals, Composite, EngagementDecision, FactorTrace, ProbabilityCompositor,
    ProbabilityInputs,
};
pub use proactive::{
    FailureReport, OutcomeReport, ProactivePhase, ProactiveScheduler, ProactiveState, SuppressReason,
    TickOutcome, TriggerIntent,
};
pub use quiet::QuietHours;
pub use score::{
    escalation_tier, perturbed_failure_budget, AdaptiveParameters, EscalationTier,
    InteractionScoreController, ScoreBand, ScoreLevel, ScoreState,
};
pub use time_period::{ease, TimeFactor, TimePeriodModulator};
