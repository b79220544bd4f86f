//! EngagementEngine — ties the limbic state and the expression layer into
//! one per-conversation decision surface.
//!
//! Every conversation owns a [`ConversationState`] behind its own mutex, so
//! traffic in one conversation never waits on another. All operations take
//! `now` explicitly and never block on I/O.

use cadence_core::{
    elapsed_secs, CadenceConfig, Classifier, Clock, ConfigError, ConversationId, Draw,
    KeywordClassifier, SeededDraw, SystemClock, UserId,
};
use cadence_expression::{
    AdaptiveParameters, Bypass, EngagementDecision, EscalationTier, OutcomeReport,
    ProactiveScheduler, ProactiveState, ProbabilityCompositor, ProbabilityInputs, TickOutcome,
    TimePeriodModulator, TriggerIntent,
};
use cadence_limbic::{
    AttentionRoster, AttentionTracker, ConversationMood, EffectiveAttention, MessageContext,
    MoodEngine, MoodReading, ReplyEffect, UserAttentionProfile,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Everything the engine knows about one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub roster: AttentionRoster,
    pub mood: Option<ConversationMood>,
    pub proactive: ProactiveState,
    pub created_at: NaiveDateTime,
    /// Set once the state has been removed from the engine's map.
    #[serde(skip)]
    detached: bool,
}

impl ConversationState {
    /// Latest real activity: messages, replies, sends or outcomes.
    pub fn last_activity_at(&self) -> NaiveDateTime {
        let p = &self.proactive;
        [
            self.roster.last_interaction_at(),
            self.mood.as_ref().map(|m| m.last_updated_at),
            p.silence_anchor_at,
            p.sent_at,
            p.score.last_activity_at,
            p.user_message_times.back().copied(),
        ]
        .into_iter()
        .flatten()
        .fold(self.created_at, NaiveDateTime::max)
    }
}

/// An inbound chat message, as far as the engine cares.
#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    pub user: &'a UserId,
    pub display_name: Option<&'a str>,
    pub text: &'a str,
}

impl<'a> InboundMessage<'a> {
    pub fn new(user: &'a UserId, text: &'a str) -> Self {
        Self {
            user,
            display_name: None,
            text,
        }
    }
}

type Shared = Arc<Mutex<ConversationState>>;

fn lock(state: &Shared) -> MutexGuard<'_, ConversationState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The engagement decision engine.
///
/// Lock ordering (to prevent deadlocks):
///   conversations map → one conversation's state
///
/// The map lock is only held long enough to look up or insert the
/// conversation's handle; no two conversation locks are ever held at once.
/// Removal (sweep, reset_all) marks the state detached under both locks, so
/// a caller that fetched the handle just before removal retries against the
/// live entry instead of mutating an orphan.
pub struct EngagementEngine {
    config: CadenceConfig,
    attention: AttentionTracker,
    mood: MoodEngine,
    compositor: ProbabilityCompositor,
    reply_time: TimePeriodModulator,
    scheduler: ProactiveScheduler,
    draw: Arc<dyn Draw>,
    clock: Arc<dyn Clock>,
    conversations: RwLock<HashMap<ConversationId, Shared>>,
    /// Bumped on every mutation; the snapshot flusher compares against it.
    generation: AtomicU64,
}

impl EngagementEngine {
    /// Validate `config` and build an engine with the keyword classifier,
    /// the wall clock and a draw seeded from `config.seed`.
    pub fn new(config: CadenceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let draw: Arc<dyn Draw> = match config.seed {
            Some(seed) => Arc::new(SeededDraw::seed_from_u64(seed)),
            None => Arc::new(SeededDraw::from_entropy()),
        };
        let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::from_config(&config.sentiment));
        Ok(Self::with_parts(config, Arc::new(SystemClock), draw, Some(classifier)))
    }

    /// Assemble an engine from explicit collaborators. `config` is trusted.
    pub fn with_parts(
        config: CadenceConfig,
        clock: Arc<dyn Clock>,
        draw: Arc<dyn Draw>,
        classifier: Option<Arc<dyn Classifier>>,
    ) -> Self {
        let (attention, mood) = match classifier {
            Some(c) => (
                AttentionTracker::with_classifier(config.attention.clone(), Arc::clone(&c)),
                MoodEngine::with_classifier(config.mood.clone(), c),
            ),
            None => (
                AttentionTracker::new(config.attention.clone()),
                MoodEngine::new(config.mood.clone()),
            ),
        };
        Self {
            attention,
            mood,
            compositor: ProbabilityCompositor::from_config(&config.reply),
            reply_time: TimePeriodModulator::new(config.reply.time_periods.clone()),
            scheduler: ProactiveScheduler::new(
                config.proactive.clone(),
                config.score.clone(),
                config.escalation.clone(),
            ),
            draw,
            clock,
            conversations: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // ========================================================================
    // Store
    // ========================================================================

    fn fresh_state(&self, conv: &ConversationId, now: NaiveDateTime) -> ConversationState {
        ConversationState {
            roster: AttentionRoster::new(conv.clone()),
            mood: None,
            proactive: self.scheduler.new_state(conv.clone()),
            created_at: now,
            detached: false,
        }
    }

    fn existing(&self, conv: &ConversationId) -> Option<Shared> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conv)
            .cloned()
    }

    fn entry(&self, conv: &ConversationId, now: NaiveDateTime) -> Shared {
        if let Some(found) = self.existing(conv) {
            return found;
        }
        let mut map = self.conversations.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(conv.clone()).or_insert_with(|| {
            tracing::debug!("Tracking new conversation {}", conv);
            Arc::new(Mutex::new(self.fresh_state(conv, now)))
        }))
    }

    /// Run `f` on the live state of `conv`, creating it if needed.
    fn with_live<T>(
        &self,
        conv: &ConversationId,
        now: NaiveDateTime,
        f: impl FnOnce(&mut ConversationState) -> T,
    ) -> T {
        loop {
            let shared = self.entry(conv, now);
            let mut state = lock(&shared);
            if !state.detached {
                return f(&mut state);
            }
        }
    }

    /// Like [`Self::with_live`], but never creates a conversation.
    fn with_existing<T>(
        &self,
        conv: &ConversationId,
        f: impl FnOnce(&mut ConversationState) -> T,
    ) -> Option<T> {
        loop {
            let shared = self.existing(conv)?;
            let mut state = lock(&shared);
            if !state.detached {
                return Some(f(&mut state));
            }
        }
    }

    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        let map = self.conversations.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = map.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Decay-driven cleanup inside one conversation. True if anything was dropped.
    fn sweep_state(&self, state: &mut ConversationState, now: NaiveDateTime) -> bool {
        let removed = self.attention.sweep(&mut state.roster, now);
        let mood_dropped = self.mood.sweep(&mut state.mood, now);
        removed > 0 || mood_dropped
    }

    // ========================================================================
    // Reply path
    // ========================================================================

    /// A user spoke. Feeds the mood and the proactive activity window.
    pub fn observe_message(
        &self,
        conv: &ConversationId,
        message: InboundMessage<'_>,
        now: NaiveDateTime,
    ) -> MoodReading {
        let reading = self.with_live(conv, now, |state| {
            let reading = self.mood.observe(&mut state.mood, conv, message.text, now);
            self.scheduler
                .observe_user_message(&mut state.proactive, message.user, now);
            reading
        });
        self.touch();
        reading
    }

    /// Should the agent reply to `user` right now?
    pub fn evaluate_reply(
        &self,
        conv: &ConversationId,
        user: &UserId,
        now: NaiveDateTime,
        bypass: Bypass,
    ) -> EngagementDecision {
        if bypass != Bypass::None {
            tracing::debug!("Reply to {} in {} bypassed ({:?})", user, conv, bypass);
            return EngagementDecision::bypassed(bypass);
        }

        let base = self.config.reply.base_probability;
        let (swept, inputs) = self.with_live(conv, now, |state| {
            let swept = self.sweep_state(state, now);
            let factors = self.attention.factors(&state.roster, user, now);
            let inputs = ProbabilityInputs {
                attention: factors.map(|f| f.attention),
                emotion: factors.map(|f| f.emotion),
                time_factor: self.reply_time.factor_at(now).factor,
                spillover: self.attention.spillover_boost(&state.roster, user, base, now),
                proactive_boost: if state.proactive.is_boost_window_open(now) {
                    self.config.proactive.temp_boost_probability
                } else {
                    0.0
                },
                fatigue_penalty: self.attention.fatigue_penalty(&state.roster, user, now),
                ..ProbabilityInputs::new(base)
            };
            (swept, inputs)
        });
        if swept {
            self.touch();
        }

        let composite = self.compositor.compute(&inputs);
        let decision = EngagementDecision::drawn(composite, self.draw.draw());
        tracing::debug!(
            "Reply decision for {} in {}: p={:.3} draw={:.3} engage={}",
            user,
            conv,
            composite.probability,
            decision.draw.unwrap_or_default(),
            decision.engage
        );
        decision
    }

    pub fn on_attention_event(
        &self,
        conv: &ConversationId,
        user: &UserId,
        replied: bool,
        now: NaiveDateTime,
    ) -> Option<ReplyEffect> {
        self.on_attention_event_with(conv, user, replied, MessageContext::default(), now)
    }

    /// The agent replied to `user` (or decided not to). A reply also counts
    /// as agent activity for the proactive silence clock.
    pub fn on_attention_event_with(
        &self,
        conv: &ConversationId,
        user: &UserId,
        replied: bool,
        ctx: MessageContext<'_>,
        now: NaiveDateTime,
    ) -> Option<ReplyEffect> {
        let effect = self.with_live(conv, now, |state| {
            if replied {
                let effect = self.attention.record_reply(&mut state.roster, user, ctx, now);
                self.scheduler.observe_agent_message(&mut state.proactive, now);
                effect
            } else {
                self.attention.record_no_reply(&mut state.roster, user, now);
                None
            }
        });
        self.touch();
        effect
    }

    // ========================================================================
    // Proactive path
    // ========================================================================

    pub fn tick(&self, conv: &ConversationId, now: NaiveDateTime) -> TickOutcome {
        let outcome = self.with_live(conv, now, |state| {
            self.sweep_state(state, now);
            self.scheduler.tick(&mut state.proactive, now, self.draw.as_ref())
        });
        self.touch();
        outcome
    }

    /// Tick every known conversation; returns the intents that fired.
    pub fn tick_all(&self, now: NaiveDateTime) -> Vec<TriggerIntent> {
        self.conversation_ids()
            .iter()
            .filter_map(|conv| self.tick(conv, now).intent())
            .collect()
    }

    /// Returns false when no intent was pending (logged and ignored).
    pub fn report_proactive_send(&self, conv: &ConversationId, ok: bool, now: NaiveDateTime) -> bool {
        let result = self.with_existing(conv, |state| {
            self.scheduler.report_send(&mut state.proactive, ok, now)
        });
        let Some(result) = result else {
            tracing::warn!("Proactive send reported for unknown conversation {}", conv);
            return false;
        };
        match result {
            Ok(()) => {
                self.touch();
                true
            }
            Err(e) => {
                tracing::warn!("Ignoring proactive send for {}: {}", conv, e);
                false
            }
        }
    }

    /// `None` when nothing was awaiting an outcome (logged and ignored).
    pub fn report_proactive_outcome(
        &self,
        conv: &ConversationId,
        engaged: bool,
        latency_secs: Option<f64>,
        responders: Option<u32>,
        now: NaiveDateTime,
    ) -> Option<OutcomeReport> {
        let result = self.with_existing(conv, |state| {
            self.scheduler.report_outcome(
                &mut state.proactive,
                engaged,
                latency_secs,
                responders,
                now,
                self.draw.as_ref(),
            )
        });
        let Some(result) = result else {
            tracing::warn!("Proactive outcome reported for unknown conversation {}", conv);
            return None;
        };
        match result {
            Ok(report) => {
                self.touch();
                Some(report)
            }
            Err(e) => {
                tracing::warn!("Ignoring proactive outcome for {}: {}", conv, e);
                None
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Forget everything about one conversation.
    pub fn reset_conversation(&self, conv: &ConversationId) {
        let reset = self.with_existing(conv, |state| {
            *state = self.fresh_state(conv, state.created_at);
        });
        if reset.is_some() {
            tracing::info!("Reset conversation {}", conv);
            self.touch();
        }
    }

    pub fn reset_all(&self) {
        let mut map = self.conversations.write().unwrap_or_else(PoisonError::into_inner);
        let n = map.len();
        for shared in map.values() {
            lock(shared).detached = true;
        }
        map.clear();
        tracing::info!("Reset all {} conversation(s)", n);
        self.touch();
    }

    /// Drop faded profiles and moods everywhere, and whole conversations
    /// idle longer than the retention period. Returns conversations dropped.
    pub fn sweep(&self, now: NaiveDateTime) -> usize {
        let retention = self.config.proactive.conversation_retention_secs;
        let mut map = self.conversations.write().unwrap_or_else(PoisonError::into_inner);
        let mut dropped = 0;
        map.retain(|conv, shared| {
            let mut state = lock(shared);
            self.sweep_state(&mut state, now);
            let idle = elapsed_secs(state.last_activity_at(), now);
            if idle > retention {
                tracing::info!("Dropping conversation {} after {:.0}s idle", conv, idle);
                state.detached = true;
                dropped += 1;
                return false;
            }
            true
        });
        drop(map);
        self.touch();
        dropped
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Copy of every conversation's state, keyed by id.
    pub(crate) fn export(&self) -> Vec<(ConversationId, ConversationState)> {
        let handles: Vec<(ConversationId, Shared)> = {
            let map = self.conversations.read().unwrap_or_else(PoisonError::into_inner);
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        handles
            .into_iter()
            .map(|(conv, shared)| {
                let state = lock(&shared).clone();
                (conv, state)
            })
            .collect()
    }

    /// Replace the whole store with `states`.
    pub(crate) fn import(&self, states: impl IntoIterator<Item = (ConversationId, ConversationState)>) {
        let fresh: HashMap<_, _> = states
            .into_iter()
            .map(|(conv, state)| (conv, Arc::new(Mutex::new(state))))
            .collect();
        let mut map = self.conversations.write().unwrap_or_else(PoisonError::into_inner);
        for shared in map.values() {
            lock(shared).detached = true;
        }
        *map = fresh;
        drop(map);
        self.touch();
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    fn read<T>(&self, conv: &ConversationId, f: impl FnOnce(&ConversationState) -> T) -> Option<T> {
        self.with_existing(conv, |state| f(state))
    }

    pub fn attention_profile(&self, conv: &ConversationId, user: &UserId) -> Option<UserAttentionProfile> {
        self.read(conv, |s| s.roster.profile(user).cloned()).flatten()
    }

    /// Decayed attention and emotion for `user`, ignoring cooldowns.
    pub fn attention(
        &self,
        conv: &ConversationId,
        user: &UserId,
        now: NaiveDateTime,
    ) -> Option<EffectiveAttention> {
        self.read(conv, |s| s.roster.profile(user).map(|p| self.attention.effective(p, now)))
            .flatten()
    }

    pub fn mood(&self, conv: &ConversationId, now: NaiveDateTime) -> MoodReading {
        self.read(conv, |s| self.mood.effective(s.mood.as_ref(), now))
            .unwrap_or_else(|| self.mood.effective(None, now))
    }

    pub fn proactive_state(&self, conv: &ConversationId) -> Option<ProactiveState> {
        self.read(conv, |s| s.proactive.clone())
    }

    pub fn adaptive_parameters(&self, conv: &ConversationId) -> Option<AdaptiveParameters> {
        self.read(conv, |s| self.scheduler.adaptive_parameters(&s.proactive))
    }

    pub fn escalation_tier(&self, conv: &ConversationId) -> Option<EscalationTier> {
        self.read(conv, |s| self.scheduler.escalation_tier(&s.proactive))
    }

    /// Mutable access for tests and tooling.
    pub fn with_state<T>(
        &self,
        conv: &ConversationId,
        now: NaiveDateTime,
        f: impl FnOnce(&mut ConversationState) -> T,
    ) -> T {
        let out = self.with_live(conv, now, f);
        self.touch();
        out
    }
}
