//! Keyword-based sentiment and mood classification.
//!
//! Shared by the attention tracker (emotion deltas) and the mood engine
//! (mood labels). Anything smarter plugs in through [`Classifier`].

use crate::config::{MoodLexicon, SentimentConfig};

/// Result of classifying one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Dominant mood label, if any lexicon matched.
    pub label: Option<String>,
    /// Signed emotion adjustment. Positive adds on top of the base step,
    /// negative replaces it.
    pub delta: f64,
}

pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

/// Counts keyword hits, skipping hits preceded by a negation word within a
/// short character window.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    moods: Vec<MoodLexicon>,
    positive: Vec<String>,
    negative: Vec<String>,
    negation_words: Vec<String>,
    negation_window: usize,
    positive_bonus: f64,
    negative_decrease: f64,
}

impl KeywordClassifier {
    pub fn from_config(config: &SentimentConfig) -> Self {
        Self {
            moods: config.moods.clone(),
            positive: config.positive.clone(),
            negative: config.negative.clone(),
            negation_words: if config.enable_negation {
                config.negation_words.clone()
            } else {
                Vec::new()
            },
            negation_window: config.negation_window,
            positive_bonus: config.positive_bonus,
            negative_decrease: config.negative_decrease,
        }
    }

    fn negated(&self, text: &str, byte_pos: usize) -> bool {
        if self.negation_words.is_empty() {
            return false;
        }
        let mut before: Vec<char> = text[..byte_pos]
            .chars()
            .rev()
            .take(self.negation_window)
            .collect();
        before.reverse();
        let before: String = before.into_iter().collect();
        self.negation_words.iter().any(|n| before.contains(n.as_str()))
    }

    fn hits(&self, text: &str, keywords: &[String]) -> usize {
        keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| {
                text.match_indices(k.as_str())
                    .filter(|(pos, _)| !self.negated(text, *pos))
                    .count()
            })
            .sum()
    }

    /// Highest-scoring mood; ties go to the earlier lexicon.
    pub fn detect_mood(&self, text: &str) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;
        for lexicon in &self.moods {
            let score = self.hits(text, &lexicon.keywords);
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((&lexicon.label, score));
            }
        }
        best.map(|(label, _)| label.to_string())
    }

    pub fn emotion_delta(&self, text: &str) -> f64 {
        let pos = self.hits(text, &self.positive);
        let neg = self.hits(text, &self.negative);
        match pos.cmp(&neg) {
            std::cmp::Ordering::Greater => self.positive_bonus,
            std::cmp::Ordering::Less => -self.negative_decrease,
            std::cmp::Ordering::Equal => 0.0,
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::from_config(&SentimentConfig::default())
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        if text.is_empty() {
            return Classification::default();
        }
        Classification {
            label: self.detect_mood(text),
            delta: self.emotion_delta(text),
        }
    }
}
