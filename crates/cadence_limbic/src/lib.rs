//! Fast, non-verbal conversation state.
//!
//! Everything here decays with time and is read through `effective(now)`
//! views; nothing spawns timers.

pub mod attention;
pub mod decay;
pub mod mood;

pub use attention::{
    AttentionRoster, AttentionTracker, EffectiveAttention, FatigueLevel, MessageContext,
    ReplyEffect, UserAttentionProfile,
};
pub use decay::half_life_decay;
pub use mood::{ConversationMood, MoodEngine, MoodLevel, MoodReading};
