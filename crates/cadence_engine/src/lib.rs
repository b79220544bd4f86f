pub mod coordinator;
pub mod snapshot;

pub use coordinator::{ConversationState, EngagementEngine, InboundMessage};
pub use snapshot::{
    spawn_flusher, EngineSnapshot, FileSnapshotStore, SnapshotError, SnapshotStore, SNAPSHOT_VERSION,
};
