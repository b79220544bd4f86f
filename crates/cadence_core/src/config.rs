use crate::error::ConfigError;
use crate::time::ClockTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Seed for the decision RNG. Unset means entropy.
    pub seed: Option<u64>,
    pub reply: ReplyConfig,
    pub attention: AttentionConfig,
    pub mood: MoodConfig,
    pub sentiment: SentimentConfig,
    pub proactive: ProactiveConfig,
    pub score: ScoreConfig,
    pub escalation: EscalationConfig,
    pub persistence: PersistenceConfig,
}

impl CadenceConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// Env var overrides are applied, then the result is validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: CadenceConfig = toml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    /// A file that exists and is invalid is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            tracing::info!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            let mut cfg = Self::default();
            cfg.apply_env_overrides();
            cfg.validate()?;
            return Ok(cfg);
        }
        Self::load(path)
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CADENCE_REPLY_PROBABILITY") {
            if let Ok(p) = v.parse() {
                self.reply.base_probability = p;
            }
        }
        if let Ok(v) = std::env::var("CADENCE_PROACTIVE_PROBABILITY") {
            if let Ok(p) = v.parse() {
                self.proactive.base_probability = p;
            }
        }
        if let Ok(v) = std::env::var("CADENCE_SNAPSHOT_PATH") {
            self.persistence.snapshot_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("CADENCE_SEED") {
            if let Ok(seed) = v.parse() {
                self.seed = Some(seed);
            }
        }
    }

    /// Reject anything that would only fail at use time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reply.validate()?;
        self.attention.validate()?;
        self.mood.validate()?;
        self.sentiment.validate()?;
        self.proactive.validate()?;
        self.score.validate()?;
        self.escalation.validate()?;
        Ok(())
    }
}

fn unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::out_of_bounds(field, value, "must be within [0, 1]"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::out_of_bounds(field, value, "must be finite and >= 0"))
    }
}

/// Longest span any `*_secs` setting may take.
pub const MAX_DURATION_SECS: f64 = 365.0 * 86_400.0;

fn duration_secs(field: &str, value: f64) -> Result<(), ConfigError> {
    non_negative(field, value)?;
    if value <= MAX_DURATION_SECS {
        Ok(())
    } else {
        Err(ConfigError::out_of_bounds(field, value, "must not exceed 365 days"))
    }
}

fn positive_duration_secs(field: &str, value: f64) -> Result<(), ConfigError> {
    positive(field, value)?;
    duration_secs(field, value)
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::out_of_bounds(field, value, "must be finite and > 0"))
    }
}

fn ordered(field: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange {
            field: field.to_string(),
            min,
            max,
        })
    }
}

// ============================================================================
// Reply decisions
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HardLimits {
    pub enabled: bool,
    pub min: f64,
    pub max: f64,
}

impl HardLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            enabled: true,
            min,
            max,
        }
    }

    /// Effective clamp bounds; disabled limits still keep a probability.
    pub fn bounds(&self) -> (f64, f64) {
        if self.enabled {
            (self.min, self.max)
        } else {
            (0.0, 1.0)
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        unit(&format!("{field}.min"), self.min)?;
        unit(&format!("{field}.max"), self.max)?;
        ordered(field, self.min, self.max)
    }
}

impl Default for HardLimits {
    fn default() -> Self {
        Self {
            enabled: false,
            min: 0.05,
            max: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    pub base_probability: f64,
    /// attentionFactor = 1 + attention × weight
    pub attention_weight: f64,
    /// emotionFactor = 1 + emotion × weight
    pub emotion_weight: f64,
    pub hard_limits: HardLimits,
    pub time_periods: TimePeriodConfig,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            base_probability: 0.3,
            attention_weight: 0.4,
            emotion_weight: 0.3,
            hard_limits: HardLimits::default(),
            time_periods: TimePeriodConfig::default(),
        }
    }
}

impl ReplyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        unit("reply.base_probability", self.base_probability)?;
        non_negative("reply.attention_weight", self.attention_weight)?;
        unit("reply.emotion_weight", self.emotion_weight)?;
        self.hard_limits.validate("reply.hard_limits")?;
        self.time_periods.validate("reply.time_periods")
    }
}

// ============================================================================
// Time-of-day modulation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EasingCurve {
    /// Half-cosine ease in/out.
    #[default]
    Sine,
    /// Smoothstep polynomial 3t² − 2t³.
    Cubic,
}

/// A named daily window with a multiplicative factor.
#[derive(Debug, Clone, Deserialize)]
pub struct TimePeriodRule {
    #[serde(default)]
    pub name: String,
    pub start: ClockTime,
    pub end: ClockTime,
    pub factor: f64,
    /// Overrides the modulator-wide smoothing switch for this window.
    #[serde(default)]
    pub smooth_curve: Option<bool>,
}

impl TimePeriodRule {
    pub fn new(name: &str, start: ClockTime, end: ClockTime, factor: f64) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
            factor,
            smooth_curve: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimePeriodConfig {
    pub enabled: bool,
    pub transition_minutes: f64,
    pub use_smooth_curve: bool,
    pub curve: EasingCurve,
    pub min_factor: f64,
    pub max_factor: f64,
    /// First match wins.
    pub windows: Vec<TimePeriodRule>,
}

impl Default for TimePeriodConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transition_minutes: 30.0,
            use_smooth_curve: true,
            curve: EasingCurve::Sine,
            min_factor: 0.1,
            max_factor: 2.0,
            windows: Vec::new(),
        }
    }
}

impl TimePeriodConfig {
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        non_negative(&format!("{field}.transition_minutes"), self.transition_minutes)?;
        non_negative(&format!("{field}.min_factor"), self.min_factor)?;
        non_negative(&format!("{field}.max_factor"), self.max_factor)?;
        ordered(field, self.min_factor, self.max_factor)?;
        for rule in &self.windows {
            non_negative(&format!("{field}.windows[{}].factor", rule.name), rule.factor)?;
        }
        Ok(())
    }
}

// ============================================================================
// Attention
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpilloverConfig {
    pub enabled: bool,
    /// Share of the warmth that spills to users without a profile.
    pub ratio: f64,
    pub halflife_secs: f64,
    /// Peak attention needed to record conversation activity.
    pub min_trigger: f64,
    /// Probability a fully attended user would reach; the boost is a share
    /// of the gap between it and the base probability.
    pub reference_probability: f64,
}

impl Default for SpilloverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ratio: 0.35,
            halflife_secs: 90.0,
            min_trigger: 0.4,
            reference_probability: 0.9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    pub enabled: bool,
    /// A gap this long between replies to the same user resets the streak.
    pub reset_after_secs: f64,
    pub light_at: u32,
    pub medium_at: u32,
    pub heavy_at: u32,
    pub light_penalty: f64,
    pub medium_penalty: f64,
    pub heavy_penalty: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reset_after_secs: 300.0,
            light_at: 3,
            medium_at: 5,
            heavy_at: 8,
            light_penalty: 0.1,
            medium_penalty: 0.2,
            heavy_penalty: 0.35,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttentionCooldownConfig {
    pub enabled: bool,
    /// A declined user whose attention was above this enters cooldown.
    pub trigger_threshold: f64,
    pub duration_secs: f64,
}

impl Default for AttentionCooldownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_threshold: 0.3,
            duration_secs: 600.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    pub enabled: bool,
    pub max_tracked_users: usize,
    pub attention_halflife_secs: f64,
    pub emotion_halflife_secs: f64,
    pub boost_step: f64,
    pub decrease_step: f64,
    pub emotion_step: f64,
    pub no_reply_step: f64,
    /// Users below this are not lowered further on a declined message.
    pub no_reply_protection: f64,
    pub sweep_floor: f64,
    pub stale_ttl_secs: f64,
    pub stale_ttl_multiple: f64,
    pub preview_chars: usize,
    pub spillover: SpilloverConfig,
    pub fatigue: FatigueConfig,
    pub cooldown: AttentionCooldownConfig,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tracked_users: 10,
            attention_halflife_secs: 300.0,
            emotion_halflife_secs: 600.0,
            boost_step: 0.4,
            decrease_step: 0.1,
            emotion_step: 0.1,
            no_reply_step: 0.15,
            no_reply_protection: 0.3,
            sweep_floor: 0.05,
            stale_ttl_secs: 600.0,
            stale_ttl_multiple: 3.0,
            preview_chars: 50,
            spillover: SpilloverConfig::default(),
            fatigue: FatigueConfig::default(),
            cooldown: AttentionCooldownConfig::default(),
        }
    }
}

impl AttentionConfig {
    /// Idle age after which a faded profile may be swept.
    pub fn stale_after_secs(&self) -> f64 {
        self.stale_ttl_secs * self.stale_ttl_multiple
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tracked_users == 0 {
            return Err(ConfigError::out_of_bounds(
                "attention.max_tracked_users",
                0.0,
                "must track at least one user",
            ));
        }
        positive_duration_secs("attention.attention_halflife_secs", self.attention_halflife_secs)?;
        positive_duration_secs("attention.emotion_halflife_secs", self.emotion_halflife_secs)?;
        unit("attention.boost_step", self.boost_step)?;
        unit("attention.decrease_step", self.decrease_step)?;
        unit("attention.emotion_step", self.emotion_step)?;
        unit("attention.no_reply_step", self.no_reply_step)?;
        unit("attention.no_reply_protection", self.no_reply_protection)?;
        unit("attention.sweep_floor", self.sweep_floor)?;
        duration_secs("attention.stale_ttl_secs", self.stale_ttl_secs)?;
        non_negative("attention.stale_ttl_multiple", self.stale_ttl_multiple)?;

        unit("attention.spillover.ratio", self.spillover.ratio)?;
        positive_duration_secs(
            "attention.spillover.halflife_secs",
            self.spillover.halflife_secs,
        )?;
        unit("attention.spillover.min_trigger", self.spillover.min_trigger)?;
        unit(
            "attention.spillover.reference_probability",
            self.spillover.reference_probability,
        )?;

        let f = &self.fatigue;
        duration_secs("attention.fatigue.reset_after_secs", f.reset_after_secs)?;
        ordered(
            "attention.fatigue.light_at..medium_at",
            f.light_at as f64,
            f.medium_at as f64,
        )?;
        ordered(
            "attention.fatigue.medium_at..heavy_at",
            f.medium_at as f64,
            f.heavy_at as f64,
        )?;
        unit("attention.fatigue.light_penalty", f.light_penalty)?;
        unit("attention.fatigue.medium_penalty", f.medium_penalty)?;
        unit("attention.fatigue.heavy_penalty", f.heavy_penalty)?;

        unit(
            "attention.cooldown.trigger_threshold",
            self.cooldown.trigger_threshold,
        )?;
        duration_secs("attention.cooldown.duration_secs", self.cooldown.duration_secs)
    }
}

// ============================================================================
// Mood
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MoodConfig {
    pub enabled: bool,
    pub neutral_label: String,
    pub halflife_secs: f64,
    pub initial_intensity: f64,
    pub intensity_boost: f64,
    /// Below this the mood reads as neutral.
    pub negligible_intensity: f64,
    pub inactive_after_secs: f64,
}

impl Default for MoodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            neutral_label: "平静".to_string(),
            halflife_secs: 300.0,
            initial_intensity: 0.5,
            intensity_boost: 0.3,
            negligible_intensity: 0.1,
            inactive_after_secs: 3600.0,
        }
    }
}

impl MoodConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        positive_duration_secs("mood.halflife_secs", self.halflife_secs)?;
        unit("mood.initial_intensity", self.initial_intensity)?;
        unit("mood.intensity_boost", self.intensity_boost)?;
        unit("mood.negligible_intensity", self.negligible_intensity)?;
        duration_secs("mood.inactive_after_secs", self.inactive_after_secs)
    }
}

// ============================================================================
// Sentiment lexicons
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MoodLexicon {
    pub label: String,
    pub keywords: Vec<String>,
}

impl MoodLexicon {
    pub fn new(label: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    /// Declared order breaks ties.
    pub moods: Vec<MoodLexicon>,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub enable_negation: bool,
    pub negation_words: Vec<String>,
    /// Characters before a keyword searched for a negation word.
    pub negation_window: usize,
    pub positive_bonus: f64,
    pub negative_decrease: f64,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn default_moods() -> Vec<MoodLexicon> {
    vec![
        MoodLexicon::new(
            "开心",
            &[
                "哈哈", "笑", "😂", "😄", "👍", "棒", "赞", "好评", "厉害", "nb", "牛", "开心",
                "高兴", "快乐",
            ],
        ),
        MoodLexicon::new(
            "难过",
            &["难过", "伤心", "哭", "😢", "😭", "呜呜", "555", "心疼", "悲伤"],
        ),
        MoodLexicon::new(
            "生气",
            &["生气", "气", "烦", "😡", "😠", "恼火", "讨厌", "愤怒"],
        ),
        MoodLexicon::new(
            "惊讶",
            &["哇", "天哪", "😮", "😲", "震惊", "卧槽", "我去", "惊讶"],
        ),
        MoodLexicon::new(
            "疑惑",
            &["？", "疑惑", "🤔", "为什么", "怎么", "什么", "不懂"],
        ),
        MoodLexicon::new("无语", &["无语", "😑", "...", "服了", "醉了", "无言"]),
        MoodLexicon::new(
            "兴奋",
            &["！！", "激动", "😆", "🎉", "太好了", "yes", "耶", "兴奋"],
        ),
    ]
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            moods: default_moods(),
            positive: words(&[
                "哈哈", "开心", "高兴", "喜欢", "谢谢", "感谢", "棒", "厉害", "赞", "😊", "👍",
                "❤️", "thanks", "great", "love", "nice",
            ]),
            negative: words(&[
                "难过", "伤心", "讨厌", "烦", "生气", "糟糕", "滚", "😢", "😡", "💔", "hate",
                "awful", "angry", "sad",
            ]),
            enable_negation: true,
            negation_words: words(&[
                "不", "没", "别", "非", "无", "未", "勿", "莫", "不是", "没有", "别再",
                "一点也不", "根本不", "从不", "绝不", "毫不", "not", "never", "don't",
            ]),
            negation_window: 5,
            positive_bonus: 0.1,
            negative_decrease: 0.15,
        }
    }
}

impl SentimentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        unit("sentiment.positive_bonus", self.positive_bonus)?;
        unit("sentiment.negative_decrease", self.negative_decrease)
    }
}

// ============================================================================
// Proactive scheduling
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuietHoursConfig {
    pub enabled: bool,
    pub start: ClockTime,
    pub end: ClockTime,
    pub transition_minutes: f64,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: ClockTime::new(23, 0).unwrap_or_default(),
            end: ClockTime::new(7, 0).unwrap_or_default(),
            transition_minutes: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProactiveConfig {
    pub enabled: bool,
    pub base_probability: f64,
    pub silence_threshold_secs: f64,
    pub cooldown_secs: f64,
    pub max_consecutive_failures: u32,
    /// 0 disables; otherwise the per-round failure budget is randomised.
    pub failure_budget_perturbation: f64,
    pub require_user_activity: bool,
    pub min_user_messages: usize,
    pub activity_window_secs: f64,
    /// Length of the outcome window opened by a confirmed send.
    pub temp_boost_secs: f64,
    /// Added to reply probabilities while the outcome window is open.
    pub temp_boost_probability: f64,
    /// An unacknowledged intent is abandoned after this long.
    pub intent_timeout_secs: f64,
    pub reset_silence_on_failed_draw: bool,
    /// Conversations idle this long are dropped by the sweep.
    pub conversation_retention_secs: f64,
    pub hard_limits: HardLimits,
    pub quiet_hours: QuietHoursConfig,
    pub time_periods: TimePeriodConfig,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_probability: 0.3,
            silence_threshold_secs: 600.0,
            cooldown_secs: 1800.0,
            max_consecutive_failures: 2,
            failure_budget_perturbation: 0.0,
            require_user_activity: true,
            min_user_messages: 3,
            activity_window_secs: 300.0,
            temp_boost_secs: 120.0,
            temp_boost_probability: 0.5,
            intent_timeout_secs: 120.0,
            reset_silence_on_failed_draw: true,
            conversation_retention_secs: 7.0 * 86_400.0,
            hard_limits: HardLimits::new(0.0, 0.9),
            quiet_hours: QuietHoursConfig::default(),
            time_periods: TimePeriodConfig {
                transition_minutes: 45.0,
                min_factor: 0.0,
                ..TimePeriodConfig::default()
            },
        }
    }
}

impl ProactiveConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        unit("proactive.base_probability", self.base_probability)?;
        duration_secs("proactive.silence_threshold_secs", self.silence_threshold_secs)?;
        duration_secs("proactive.cooldown_secs", self.cooldown_secs)?;
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::out_of_bounds(
                "proactive.max_consecutive_failures",
                0.0,
                "must allow at least one failure",
            ));
        }
        unit(
            "proactive.failure_budget_perturbation",
            self.failure_budget_perturbation,
        )?;
        duration_secs("proactive.activity_window_secs", self.activity_window_secs)?;
        duration_secs("proactive.temp_boost_secs", self.temp_boost_secs)?;
        unit("proactive.temp_boost_probability", self.temp_boost_probability)?;
        duration_secs("proactive.intent_timeout_secs", self.intent_timeout_secs)?;
        duration_secs(
            "proactive.conversation_retention_secs",
            self.conversation_retention_secs,
        )?;
        self.hard_limits.validate("proactive.hard_limits")?;
        non_negative(
            "proactive.quiet_hours.transition_minutes",
            self.quiet_hours.transition_minutes,
        )?;
        self.time_periods.validate("proactive.time_periods")
    }
}

// ============================================================================
// Interaction score
// ============================================================================

/// How one score band scales the proactive parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BandMultipliers {
    pub silence_threshold: f64,
    pub probability: f64,
    pub max_failures: f64,
    pub cooldown: f64,
}

impl BandMultipliers {
    pub const fn new(silence_threshold: f64, probability: f64, max_failures: f64, cooldown: f64) -> Self {
        Self {
            silence_threshold,
            probability,
            max_failures,
            cooldown,
        }
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Self {
            silence_threshold: mix(self.silence_threshold, other.silence_threshold),
            probability: mix(self.probability, other.probability),
            max_failures: mix(self.max_failures, other.max_failures),
            cooldown: mix(self.cooldown, other.cooldown),
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        non_negative(&format!("{field}.silence_threshold"), self.silence_threshold)?;
        non_negative(&format!("{field}.probability"), self.probability)?;
        non_negative(&format!("{field}.max_failures"), self.max_failures)?;
        non_negative(&format!("{field}.cooldown"), self.cooldown)
    }
}

impl Default for BandMultipliers {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreBands {
    pub energetic_above: f64,
    pub baseline_above: f64,
    pub tapering_above: f64,
    pub subdued_above: f64,
    pub energetic: BandMultipliers,
    pub baseline: BandMultipliers,
    pub subdued: BandMultipliers,
    pub dormant: BandMultipliers,
}

impl Default for ScoreBands {
    fn default() -> Self {
        Self {
            energetic_above: 70.0,
            baseline_above: 50.0,
            tapering_above: 30.0,
            subdued_above: 20.0,
            energetic: BandMultipliers::new(0.7, 1.5, 1.5, 0.5),
            baseline: BandMultipliers::new(1.0, 1.0, 1.0, 1.0),
            subdued: BandMultipliers::new(1.5, 0.5, 0.5, 2.0),
            dormant: BandMultipliers::new(2.0, 0.3, 0.5, 3.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub min: f64,
    pub max: f64,
    pub initial: f64,
    pub success_base: f64,
    pub fast_reply_bonus: f64,
    pub fast_reply_secs: f64,
    pub multi_user_bonus: f64,
    pub streak_bonus: f64,
    pub streak_length: u32,
    pub recovery_bonus: f64,
    pub recovery_threshold: f64,
    pub fail_penalty: f64,
    pub daily_decay: f64,
    pub bands: ScoreBands,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            min: 10.0,
            max: 100.0,
            initial: 50.0,
            success_base: 15.0,
            fast_reply_bonus: 5.0,
            fast_reply_secs: 30.0,
            multi_user_bonus: 10.0,
            streak_bonus: 5.0,
            streak_length: 3,
            recovery_bonus: 20.0,
            recovery_threshold: 30.0,
            fail_penalty: 8.0,
            daily_decay: 2.0,
            bands: ScoreBands::default(),
        }
    }
}

impl ScoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ordered("score.min..max", self.min, self.max)?;
        if !(self.min..=self.max).contains(&self.initial) {
            return Err(ConfigError::out_of_bounds(
                "score.initial",
                self.initial,
                "must lie within [score.min, score.max]",
            ));
        }
        for (field, v) in [
            ("score.success_base", self.success_base),
            ("score.fast_reply_bonus", self.fast_reply_bonus),
            ("score.multi_user_bonus", self.multi_user_bonus),
            ("score.streak_bonus", self.streak_bonus),
            ("score.recovery_bonus", self.recovery_bonus),
            ("score.fail_penalty", self.fail_penalty),
            ("score.daily_decay", self.daily_decay),
        ] {
            non_negative(field, v)?;
        }
        duration_secs("score.fast_reply_secs", self.fast_reply_secs)?;
        let b = &self.bands;
        ordered("score.bands.subdued_above..tapering_above", b.subdued_above, b.tapering_above)?;
        ordered("score.bands.tapering_above..baseline_above", b.tapering_above, b.baseline_above)?;
        ordered("score.bands.baseline_above..energetic_above", b.baseline_above, b.energetic_above)?;
        b.energetic.validate("score.bands.energetic")?;
        b.baseline.validate("score.bands.baseline")?;
        b.subdued.validate("score.bands.subdued")?;
        b.dormant.validate("score.bands.dormant")
    }
}

// ============================================================================
// Failure escalation
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub cap: u32,
    pub decay_on_success: u32,
    pub mild_at: u32,
    pub clear_at: u32,
    pub severe_at: u32,
    /// Time decay starts after this long without a failure.
    pub quiet_period_secs: f64,
    pub check_interval_secs: f64,
    pub decay_amount: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            cap: 15,
            decay_on_success: 2,
            mild_at: 2,
            clear_at: 3,
            severe_at: 4,
            quiet_period_secs: 12.0 * 3600.0,
            check_interval_secs: 6.0 * 3600.0,
            decay_amount: 1,
        }
    }
}

impl EscalationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ordered("escalation.mild_at..clear_at", self.mild_at as f64, self.clear_at as f64)?;
        ordered("escalation.clear_at..severe_at", self.clear_at as f64, self.severe_at as f64)?;
        positive_duration_secs("escalation.check_interval_secs", self.check_interval_secs)?;
        duration_secs("escalation.quiet_period_secs", self.quiet_period_secs)
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub snapshot_path: Option<PathBuf>,
    pub flush_interval_secs: u64,
    /// Drop in-flight proactive state (phase, window, cooldown) on start-up.
    pub clear_transient_on_load: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            flush_interval_secs: 60,
            clear_transient_on_load: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        CadenceConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg = CadenceConfig::from_toml_str(
            r#"
            [reply]
            base_probability = 0.1

            [[reply.time_periods.windows]]
            name = "night"
            start = "23:00"
            end = "07:00"
            factor = 0.2

            [proactive.quiet_hours]
            enabled = true
            start = "01:30"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.reply.base_probability, 0.1);
        assert_eq!(cfg.reply.attention_weight, 0.4);
        assert_eq!(cfg.reply.time_periods.windows.len(), 1);
        assert_eq!(cfg.reply.time_periods.windows[0].start.to_string(), "23:00");
        assert!(cfg.proactive.quiet_hours.enabled);
        assert_eq!(cfg.proactive.quiet_hours.start.to_string(), "01:30");
        assert_eq!(cfg.proactive.quiet_hours.end.to_string(), "07:00");
        assert_eq!(cfg.proactive.time_periods.transition_minutes, 45.0);
    }

    #[test]
    fn test_malformed_time_is_rejected() {
        let err = CadenceConfig::from_toml_str(
            r#"
            [proactive.quiet_hours]
            start = "25:61"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
        assert!(err.to_string().contains("25:61"));
    }

    #[test]
    fn test_inverted_factor_range_is_rejected() {
        let err = CadenceConfig::from_toml_str(
            r#"
            [reply.time_periods]
            min_factor = 2.5
            max_factor = 1.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvertedRange { .. }));
    }

    #[test]
    fn test_inverted_hard_limits_are_rejected() {
        let mut cfg = CadenceConfig::default();
        cfg.reply.hard_limits = HardLimits::new(0.9, 0.1);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_out_of_range_probability_is_rejected() {
        let mut cfg = CadenceConfig::default();
        cfg.proactive.base_probability = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        let mut cfg = CadenceConfig::default();
        cfg.proactive.temp_boost_secs = 1e15;
        match cfg.validate() {
            Err(ConfigError::OutOfBounds { field, .. }) => {
                assert_eq!(field, "proactive.temp_boost_secs")
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut cfg = CadenceConfig::default();
        cfg.attention.cooldown.duration_secs = MAX_DURATION_SECS;
        assert!(cfg.validate().is_ok());
        cfg.escalation.quiet_period_secs = MAX_DURATION_SECS + 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_negative_window_factor_is_rejected() {
        let mut cfg = CadenceConfig::default();
        cfg.reply.time_periods.windows.push(TimePeriodRule::new(
            "bad",
            ClockTime::new(1, 0).unwrap(),
            ClockTime::new(2, 0).unwrap(),
            -0.5,
        ));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_disordered_bands_are_rejected() {
        let mut cfg = CadenceConfig::default();
        cfg.score.bands.subdued_above = 40.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CadenceConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.attention.max_tracked_users, 10);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[attention]\nmax_tracked_users = 4").unwrap();
        let cfg = CadenceConfig::load(file.path()).unwrap();
        assert_eq!(cfg.attention.max_tracked_users, 4);
    }

    #[test]
    fn test_hard_limit_bounds() {
        assert_eq!(HardLimits::default().bounds(), (0.0, 1.0));
        assert_eq!(HardLimits::new(0.1, 0.7).bounds(), (0.1, 0.7));
    }
}
