//! MoodEngine — a coarse, decaying mood per conversation.

use cadence_core::config::MoodConfig;
use cadence_core::{elapsed_secs, Classifier, ConversationId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::decay::decayed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMood {
    pub conversation_id: ConversationId,
    pub mood_label: String,
    /// Stored intensity in [0, 1], valid at `last_updated_at`.
    pub mood_intensity: f64,
    pub last_updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoodLevel {
    Mild,
    Moderate,
    Strong,
}

impl fmt::Display for MoodLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MoodLevel::Mild => "mild",
            MoodLevel::Moderate => "moderate",
            MoodLevel::Strong => "strong",
        })
    }
}

/// Decayed mood at some instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MoodReading {
    pub label: String,
    pub intensity: f64,
    pub neutral: bool,
}

impl MoodReading {
    pub fn level(&self) -> MoodLevel {
        if self.intensity < 0.4 {
            MoodLevel::Mild
        } else if self.intensity < 0.7 {
            MoodLevel::Moderate
        } else {
            MoodLevel::Strong
        }
    }
}

impl fmt::Display for MoodReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.neutral {
            write!(f, "{}", self.label)
        } else {
            write!(f, "{} ({})", self.label, self.level())
        }
    }
}

pub struct MoodEngine {
    config: MoodConfig,
    classifier: Option<Arc<dyn Classifier>>,
}

impl MoodEngine {
    pub fn new(config: MoodConfig) -> Self {
        Self {
            config,
            classifier: None,
        }
    }

    pub fn with_classifier(config: MoodConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            config,
            classifier: Some(classifier),
        }
    }

    fn neutral(&self) -> MoodReading {
        MoodReading {
            label: self.config.neutral_label.clone(),
            intensity: 0.0,
            neutral: true,
        }
    }

    pub fn effective(&self, mood: Option<&ConversationMood>, now: NaiveDateTime) -> MoodReading {
        let Some(mood) = mood else {
            return self.neutral();
        };
        let intensity = decayed(
            mood.mood_intensity,
            mood.last_updated_at,
            now,
            self.config.halflife_secs,
        )
        .clamp(0.0, 1.0);
        if intensity < self.config.negligible_intensity {
            return MoodReading {
                intensity,
                ..self.neutral()
            };
        }
        MoodReading {
            label: mood.mood_label.clone(),
            intensity,
            neutral: false,
        }
    }

    /// Classify `text` and fold any detected mood into `slot`.
    pub fn observe(
        &self,
        slot: &mut Option<ConversationMood>,
        conversation_id: &ConversationId,
        text: &str,
        now: NaiveDateTime,
    ) -> MoodReading {
        if !self.config.enabled {
            return self.neutral();
        }
        let detected = self
            .classifier
            .as_ref()
            .and_then(|c| c.classify(text).label);

        if let Some(label) = detected {
            match slot {
                None => {
                    *slot = Some(ConversationMood {
                        conversation_id: conversation_id.clone(),
                        mood_label: label,
                        mood_intensity: self.config.initial_intensity,
                        last_updated_at: now,
                    });
                }
                Some(mood) => {
                    let current = decayed(
                        mood.mood_intensity,
                        mood.last_updated_at,
                        now,
                        self.config.halflife_secs,
                    );
                    if mood.mood_label != label {
                        tracing::info!(
                            "Mood in {} shifted: {} -> {}",
                            conversation_id,
                            mood.mood_label,
                            label
                        );
                    }
                    mood.mood_label = label;
                    mood.mood_intensity = (current + self.config.intensity_boost).clamp(0.0, 1.0);
                    mood.last_updated_at = mood.last_updated_at.max(now);
                }
            }
        }
        self.effective(slot.as_ref(), now)
    }

    /// True when the mood entry has been idle long enough to drop.
    pub fn is_inactive(&self, mood: &ConversationMood, now: NaiveDateTime) -> bool {
        elapsed_secs(mood.last_updated_at, now) > self.config.inactive_after_secs
    }

    pub fn sweep(&self, slot: &mut Option<ConversationMood>, now: NaiveDateTime) -> bool {
        if slot.as_ref().is_some_and(|m| self.is_inactive(m, now)) {
            *slot = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::KeywordClassifier;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
    }

    fn engine() -> MoodEngine {
        MoodEngine::with_classifier(MoodConfig::default(), Arc::new(KeywordClassifier::default()))
    }

    fn conv() -> ConversationId {
        ConversationId::from("group-1")
    }

    #[test]
    fn test_first_detection_sets_initial_intensity() {
        let e = engine();
        let mut slot = None;
        let r = e.observe(&mut slot, &conv(), "哈哈哈笑死", t0());
        assert_eq!(r.label, "开心");
        assert!((r.intensity - 0.5).abs() < 1e-9);
        assert_eq!(r.level(), MoodLevel::Moderate);
    }

    #[test]
    fn test_later_detection_decays_then_boosts() {
        let e = engine();
        let mut slot = None;
        e.observe(&mut slot, &conv(), "哈哈", t0());
        let r = e.observe(&mut slot, &conv(), "好难过", t0() + Duration::seconds(300));
        // 0.5 halves to 0.25, then +0.3
        assert_eq!(r.label, "难过");
        assert!((r.intensity - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_no_detection_leaves_state() {
        let e = engine();
        let mut slot = None;
        let r = e.observe(&mut slot, &conv(), "明天出门", t0());
        assert!(r.neutral);
        assert!(slot.is_none());
    }

    #[test]
    fn test_decays_to_neutral() {
        let e = engine();
        let mut slot = None;
        e.observe(&mut slot, &conv(), "哈哈", t0());
        let r = e.effective(slot.as_ref(), t0() + Duration::seconds(1200));
        // 0.5 / 16 is below the negligible threshold
        assert!(r.neutral);
        assert_eq!(r.label, "平静");
    }

    #[test]
    fn test_sweep_drops_inactive() {
        let e = engine();
        let mut slot = None;
        e.observe(&mut slot, &conv(), "哈哈", t0());
        assert!(!e.sweep(&mut slot, t0() + Duration::seconds(3000)));
        assert!(e.sweep(&mut slot, t0() + Duration::seconds(3601)));
        assert!(slot.is_none());
    }

    #[test]
    fn test_intensity_is_capped() {
        let e = engine();
        let mut slot = None;
        for _ in 0..5 {
            e.observe(&mut slot, &conv(), "哈哈", t0());
        }
        assert_eq!(slot.unwrap().mood_intensity, 1.0);
    }
}
