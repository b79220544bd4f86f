pub mod clock;
pub mod config;
pub mod draw;
pub mod error;
pub mod ids;
pub mod sentiment;
pub mod time;

pub use clock::{add_secs, elapsed_secs, Clock, ManualClock, SystemClock};
pub use config::CadenceConfig;
pub use draw::{Draw, FixedDraw, ScriptedDraw, SeededDraw};
pub use error::{ConfigError, InvalidStateTransition};
pub use ids::{ConversationId, UserId};
pub use sentiment::{Classification, Classifier, KeywordClassifier};
pub use time::{ClockTime, DayWindow};
