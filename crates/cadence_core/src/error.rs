use thiserror::Error;

/// Rejected configuration. Fatal at engine construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed time of day {value:?}, expected HH:MM with hour 0-23 and minute 0-59")]
    MalformedTime { value: String },

    #[error("{field}: minimum {min} is greater than maximum {max}")]
    InvertedRange { field: String, min: f64, max: f64 },

    #[error("{field} = {value} is out of bounds ({reason})")]
    OutOfBounds {
        field: String,
        value: f64,
        reason: &'static str,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn out_of_bounds(field: &str, value: f64, reason: &'static str) -> Self {
        Self::OutOfBounds {
            field: field.to_string(),
            value,
            reason,
        }
    }
}

/// A lifecycle call that does not fit the current proactive phase, e.g. an
/// outcome report with nothing awaiting. Logged and ignored by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {operation} while {phase}")]
pub struct InvalidStateTransition {
    pub operation: &'static str,
    pub phase: String,
}
