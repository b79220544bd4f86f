//! AttentionTracker — who the agent is currently focused on.
//!
//! Each conversation keeps a bounded roster of per-user attention and
//! emotion scores. Scores are stored together with the instant they were
//! last materialised (`scored_at`) and read through half-life decay, so a
//! profile that nobody touches fades without a timer.
//!
//! Besides the plain boost/decrease rules the roster carries three softer
//! signals:
//! - **spillover**: a strongly attended user warms the conversation, which
//!   lends a little probability to users who have no profile yet;
//! - **fatigue**: a long reply streak toward one user damps the reply
//!   probability and blocks further boosts until the streak breaks;
//! - **cooldown**: a user the agent just declined while attentive is kept
//!   at neutral factors for a while.

use cadence_core::config::{AttentionConfig, FatigueConfig};
use cadence_core::{add_secs, elapsed_secs, Classifier, ConversationId, UserId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::decay::decayed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAttentionProfile {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub display_name: String,
    /// Stored score in [0, 1], valid at `scored_at`.
    pub attention_score: f64,
    /// Stored score in [-1, 1], valid at `scored_at`.
    pub emotion_score: f64,
    /// Decay anchor for both scores.
    pub scored_at: NaiveDateTime,
    pub last_interaction_at: NaiveDateTime,
    pub interaction_count: u64,
    pub last_message_preview: String,
    #[serde(default)]
    pub consecutive_replies: u32,
    #[serde(default)]
    pub last_reply_at: Option<NaiveDateTime>,
}

impl UserAttentionProfile {
    fn new(conversation_id: ConversationId, user_id: UserId, now: NaiveDateTime) -> Self {
        Self {
            conversation_id,
            display_name: user_id.to_string(),
            user_id,
            attention_score: 0.0,
            emotion_score: 0.0,
            scored_at: now,
            last_interaction_at: now,
            interaction_count: 0,
            last_message_preview: String::new(),
            consecutive_replies: 0,
            last_reply_at: None,
        }
    }
}

/// Decayed view of a profile at some instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveAttention {
    pub attention: f64,
    pub emotion: f64,
}

/// Optional message details attached to an attention event.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageContext<'a> {
    pub display_name: Option<&'a str>,
    pub text: Option<&'a str>,
}

/// What a reply did to the target profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplyEffect {
    pub attention: f64,
    pub emotion: f64,
    /// False when fatigue or a cooldown suppressed the attention boost.
    pub boosted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FatigueLevel {
    None,
    Light,
    Medium,
    Heavy,
}

impl FatigueLevel {
    pub fn penalty(self, config: &FatigueConfig) -> f64 {
        match self {
            FatigueLevel::None => 0.0,
            FatigueLevel::Light => config.light_penalty,
            FatigueLevel::Medium => config.medium_penalty,
            FatigueLevel::Heavy => config.heavy_penalty,
        }
    }
}

/// Conversation warmth recorded when someone got a lot of attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationActivity {
    pub peak_attention: f64,
    pub peak_user: UserId,
    pub recorded_at: NaiveDateTime,
}

/// Per-conversation attention state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionRoster {
    pub conversation_id: ConversationId,
    profiles: BTreeMap<UserId, UserAttentionProfile>,
    #[serde(default)]
    activity: Option<ConversationActivity>,
    /// user -> cooldown end
    #[serde(default)]
    cooldowns: BTreeMap<UserId, NaiveDateTime>,
}

impl AttentionRoster {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            profiles: BTreeMap::new(),
            activity: None,
            cooldowns: BTreeMap::new(),
        }
    }

    pub fn profile(&self, user: &UserId) -> Option<&UserAttentionProfile> {
        self.profiles.get(user)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &UserAttentionProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn activity(&self) -> Option<&ConversationActivity> {
        self.activity.as_ref()
    }

    pub fn is_cooling_down(&self, user: &UserId, now: NaiveDateTime) -> bool {
        self.cooldowns.get(user).is_some_and(|until| now < *until)
    }

    /// Most recent interaction across all profiles.
    pub fn last_interaction_at(&self) -> Option<NaiveDateTime> {
        self.profiles.values().map(|p| p.last_interaction_at).max()
    }

    /// Pull stored scores back into range and re-key each profile to the
    /// roster's conversation. Returns how many profiles were touched.
    pub fn clamp_scores(&mut self) -> usize {
        let conversation_id = &self.conversation_id;
        let mut touched = 0;
        for (user, p) in self.profiles.iter_mut() {
            let attention = finite_or_zero(p.attention_score).clamp(0.0, 1.0);
            let emotion = finite_or_zero(p.emotion_score).clamp(-1.0, 1.0);
            if attention != p.attention_score
                || emotion != p.emotion_score
                || &p.user_id != user
                || &p.conversation_id != conversation_id
            {
                p.attention_score = attention;
                p.emotion_score = emotion;
                p.user_id = user.clone();
                p.conversation_id = conversation_id.clone();
                touched += 1;
            }
        }
        touched
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

pub struct AttentionTracker {
    config: AttentionConfig,
    classifier: Option<Arc<dyn Classifier>>,
}

impl AttentionTracker {
    pub fn new(config: AttentionConfig) -> Self {
        Self {
            config,
            classifier: None,
        }
    }

    pub fn with_classifier(config: AttentionConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            config,
            classifier: Some(classifier),
        }
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    /// Decayed scores without touching the profile.
    pub fn effective(&self, profile: &UserAttentionProfile, now: NaiveDateTime) -> EffectiveAttention {
        EffectiveAttention {
            attention: decayed(
                profile.attention_score,
                profile.scored_at,
                now,
                self.config.attention_halflife_secs,
            )
            .clamp(0.0, 1.0),
            emotion: decayed(
                profile.emotion_score,
                profile.scored_at,
                now,
                self.config.emotion_halflife_secs,
            )
            .clamp(-1.0, 1.0),
        }
    }

    /// Factors for a reply decision. `None` means neutral: no profile, a
    /// cooling-down user, or attention tracking disabled.
    pub fn factors(
        &self,
        roster: &AttentionRoster,
        user: &UserId,
        now: NaiveDateTime,
    ) -> Option<EffectiveAttention> {
        if !self.config.enabled || roster.is_cooling_down(user, now) {
            return None;
        }
        roster.profile(user).map(|p| self.effective(p, now))
    }

    fn rebase(&self, profile: &mut UserAttentionProfile, now: NaiveDateTime) {
        let eff = self.effective(profile, now);
        profile.attention_score = eff.attention;
        profile.emotion_score = eff.emotion;
        profile.scored_at = profile.scored_at.max(now);
    }

    /// The agent replied to `user`.
    pub fn record_reply(
        &self,
        roster: &mut AttentionRoster,
        user: &UserId,
        ctx: MessageContext<'_>,
        now: NaiveDateTime,
    ) -> Option<ReplyEffect> {
        if !self.config.enabled {
            return None;
        }

        let delta = match (&self.classifier, ctx.text) {
            (Some(c), Some(text)) => c.classify(text).delta,
            _ => 0.0,
        };

        roster.cooldowns.retain(|_, until| now < *until);
        let was_cooling = roster.cooldowns.remove(user).is_some();
        if was_cooling {
            tracing::debug!("Attention cooldown released for {} in {}", user, roster.conversation_id);
        }

        if !roster.profiles.contains_key(user) {
            self.make_room(roster, now);
            roster.profiles.insert(
                user.clone(),
                UserAttentionProfile::new(roster.conversation_id.clone(), user.clone(), now),
            );
        }

        let reset_after = self.config.fatigue.reset_after_secs;
        let mut streak = 0;
        for profile in roster.profiles.values_mut() {
            self.rebase(profile, now);
            if &profile.user_id == user {
                let continuing = profile
                    .last_reply_at
                    .is_some_and(|last| elapsed_secs(last, now) <= reset_after);
                profile.consecutive_replies = if continuing {
                    profile.consecutive_replies.saturating_add(1)
                } else {
                    1
                };
                profile.last_reply_at = Some(now);
                streak = profile.consecutive_replies;
            } else {
                profile.consecutive_replies = 0;
                profile.attention_score = (profile.attention_score - self.config.decrease_step).max(0.0);
            }
        }

        let fatigued = self.config.fatigue.enabled
            && self.fatigue_for_streak(streak) != FatigueLevel::None;
        let boosted = !was_cooling && !fatigued;

        let profile = roster.profiles.get_mut(user)?;
        if boosted {
            profile.attention_score = (profile.attention_score + self.config.boost_step).min(1.0);
        }
        profile.emotion_score = if delta < 0.0 {
            profile.emotion_score + delta
        } else {
            profile.emotion_score + self.config.emotion_step + delta
        }
        .clamp(-1.0, 1.0);

        profile.interaction_count += 1;
        profile.last_interaction_at = now;
        if let Some(name) = ctx.display_name {
            profile.display_name = name.to_string();
        }
        if let Some(text) = ctx.text {
            profile.last_message_preview = text.chars().take(self.config.preview_chars).collect();
        }

        let effect = ReplyEffect {
            attention: profile.attention_score,
            emotion: profile.emotion_score,
            boosted,
        };

        if self.config.spillover.enabled && effect.attention >= self.config.spillover.min_trigger {
            roster.activity = Some(ConversationActivity {
                peak_attention: effect.attention,
                peak_user: user.clone(),
                recorded_at: now,
            });
        }

        tracing::debug!(
            "Attention reply {} in {}: attention={:.2} emotion={:.2} boosted={} streak={}",
            user,
            roster.conversation_id,
            effect.attention,
            effect.emotion,
            boosted,
            streak
        );
        Some(effect)
    }

    /// The agent saw a message from `user` and chose not to answer.
    pub fn record_no_reply(&self, roster: &mut AttentionRoster, user: &UserId, now: NaiveDateTime) {
        if !self.config.enabled {
            return;
        }
        let Some(profile) = roster.profiles.get_mut(user) else {
            return;
        };
        let before = self.effective(profile, now).attention;
        if before < self.config.no_reply_protection {
            return;
        }
        self.rebase(profile, now);
        profile.attention_score = (profile.attention_score - self.config.no_reply_step).max(0.0);

        let cooldown = &self.config.cooldown;
        if cooldown.enabled && before > cooldown.trigger_threshold && cooldown.duration_secs > 0.0 {
            let until = add_secs(now, cooldown.duration_secs);
            roster.cooldowns.insert(user.clone(), until);
            tracing::info!(
                "Attention cooldown for {} in {} until {}",
                user,
                roster.conversation_id,
                until
            );
        }
        tracing::debug!(
            "Attention no-reply {} in {}: {:.2} -> {:.2}",
            user,
            roster.conversation_id,
            before,
            profile.attention_score
        );
    }

    /// Extra reply probability lent to a user without a profile.
    pub fn spillover_boost(
        &self,
        roster: &AttentionRoster,
        user: &UserId,
        base_probability: f64,
        now: NaiveDateTime,
    ) -> f64 {
        let spill = &self.config.spillover;
        if !self.config.enabled || !spill.enabled || roster.profile(user).is_some() {
            return 0.0;
        }
        let Some(activity) = roster.activity.as_ref() else {
            return 0.0;
        };
        let warmth = decayed(activity.peak_attention, activity.recorded_at, now, spill.halflife_secs);
        if warmth < spill.min_trigger * 0.5 {
            return 0.0;
        }
        warmth * spill.ratio * (spill.reference_probability - base_probability).max(0.0)
    }

    fn fatigue_for_streak(&self, streak: u32) -> FatigueLevel {
        let f = &self.config.fatigue;
        if streak >= f.heavy_at {
            FatigueLevel::Heavy
        } else if streak >= f.medium_at {
            FatigueLevel::Medium
        } else if streak >= f.light_at {
            FatigueLevel::Light
        } else {
            FatigueLevel::None
        }
    }

    /// Reply-streak fatigue toward `user` as of `now`.
    pub fn fatigue(&self, roster: &AttentionRoster, user: &UserId, now: NaiveDateTime) -> FatigueLevel {
        if !self.config.enabled || !self.config.fatigue.enabled {
            return FatigueLevel::None;
        }
        let Some(profile) = roster.profile(user) else {
            return FatigueLevel::None;
        };
        match profile.last_reply_at {
            Some(last) if elapsed_secs(last, now) <= self.config.fatigue.reset_after_secs => {
                self.fatigue_for_streak(profile.consecutive_replies)
            }
            _ => FatigueLevel::None,
        }
    }

    pub fn fatigue_penalty(&self, roster: &AttentionRoster, user: &UserId, now: NaiveDateTime) -> f64 {
        self.fatigue(roster, user, now).penalty(&self.config.fatigue)
    }

    /// Evict the weakest profile when the roster is full.
    fn make_room(&self, roster: &mut AttentionRoster, now: NaiveDateTime) {
        while roster.profiles.len() >= self.config.max_tracked_users {
            let weakest = roster
                .profiles
                .values()
                .min_by(|a, b| {
                    let (ea, eb) = (self.effective(a, now).attention, self.effective(b, now).attention);
                    ea.total_cmp(&eb)
                        .then(a.last_interaction_at.cmp(&b.last_interaction_at))
                })
                .map(|p| p.user_id.clone());
            let Some(weakest) = weakest else { break };
            roster.profiles.remove(&weakest);
            tracing::info!("Attention roster for {} full, evicted {}", roster.conversation_id, weakest);
        }
    }

    /// Drop faded, stale profiles and expired side state. Returns the
    /// number of profiles removed.
    pub fn sweep(&self, roster: &mut AttentionRoster, now: NaiveDateTime) -> usize {
        let before = roster.profiles.len();
        let floor = self.config.sweep_floor;
        let stale_after = self.config.stale_after_secs();
        roster.profiles.retain(|_, p| {
            let faded = self.effective(p, now).attention < floor;
            let stale = elapsed_secs(p.last_interaction_at, now) > stale_after;
            !(faded && stale)
        });
        roster.cooldowns.retain(|_, until| now < *until);

        let spill = &self.config.spillover;
        if let Some(activity) = &roster.activity {
            let warmth = decayed(activity.peak_attention, activity.recorded_at, now, spill.halflife_secs);
            if warmth < spill.min_trigger * 0.5 {
                roster.activity = None;
            }
        }

        let removed = before - roster.profiles.len();
        if removed > 0 {
            tracing::debug!("Attention sweep in {} removed {} profile(s)", roster.conversation_id, removed);
        }
        removed
    }
}
