//! Snapshot / restore and the background flusher.
//!
//! A snapshot is a versioned JSON document holding every conversation's
//! state. Stores are pluggable; the file store writes atomically through a
//! temporary file and a rename.

use anyhow::Context;
use async_trait::async_trait;
use cadence_core::ConversationId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::coordinator::{ConversationState, EngagementEngine};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("snapshot entry {key} holds state for conversation {embedded}")]
    ConversationMismatch {
        key: ConversationId,
        embedded: ConversationId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub taken_at: NaiveDateTime,
    pub conversations: BTreeMap<ConversationId, ConversationState>,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(blob: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(blob)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Drop in-flight proactive lifecycle state, keeping scores and history.
    pub fn clear_transient(&mut self) {
        for state in self.conversations.values_mut() {
            state.proactive.clear_transient();
        }
    }

    /// Every entry must describe the conversation it is keyed by.
    fn check_keys(&self) -> Result<(), SnapshotError> {
        for (key, state) in &self.conversations {
            let embedded = [
                Some(&state.roster.conversation_id),
                Some(&state.proactive.conversation_id),
                state.mood.as_ref().map(|m| &m.conversation_id),
            ];
            if let Some(other) = embedded.into_iter().flatten().find(|id| *id != key) {
                return Err(SnapshotError::ConversationMismatch {
                    key: key.clone(),
                    embedded: other.clone(),
                });
            }
        }
        Ok(())
    }
}

fn clamp_finite(v: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v.clamp(min, max)
    } else {
        fallback
    }
}

impl EngagementEngine {
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: self.now(),
            conversations: self.export().into_iter().collect(),
        }
    }

    /// Replace all state with `snapshot`, exactly as it was taken. Scores
    /// outside their ranges are clamped back in.
    pub fn restore(&self, mut snapshot: EngineSnapshot) -> Result<(), SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        snapshot.check_keys()?;
        for (conv, state) in snapshot.conversations.iter_mut() {
            if self.clamp_restored(state) {
                tracing::warn!("Clamped out-of-range values restored for {}", conv);
            }
        }
        let n = snapshot.conversations.len();
        self.import(snapshot.conversations);
        tracing::info!("Restored {} conversation(s) from snapshot", n);
        Ok(())
    }

    /// True if anything had to be pulled back into range.
    fn clamp_restored(&self, state: &mut ConversationState) -> bool {
        let mut touched = state.roster.clamp_scores() > 0;
        if let Some(mood) = state.mood.as_mut() {
            let intensity = clamp_finite(mood.mood_intensity, 0.0, 1.0, 0.0);
            touched |= intensity != mood.mood_intensity;
            mood.mood_intensity = intensity;
        }
        let bounds = &self.config().score;
        let score = &mut state.proactive.score.score;
        let clamped = clamp_finite(*score, bounds.min, bounds.max, bounds.initial);
        touched |= clamped != *score;
        *score = clamped;
        touched
    }

    /// Restore from `store` if it holds a snapshot. Returns whether one was found.
    pub async fn load_from(&self, store: &dyn SnapshotStore) -> anyhow::Result<bool> {
        let Some(mut snapshot) = store.load().await.context("Failed to load snapshot")? else {
            return Ok(false);
        };
        if self.config().persistence.clear_transient_on_load {
            snapshot.clear_transient();
        }
        self.restore(snapshot).context("Failed to restore snapshot")?;
        Ok(true)
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<EngineSnapshot>, SnapshotError>;

    async fn save(&self, snapshot: &EngineSnapshot) -> Result<(), SnapshotError>;
}

pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<EngineSnapshot>, SnapshotError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => EngineSnapshot::from_json(&blob).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &EngineSnapshot) -> Result<(), SnapshotError> {
        let blob = snapshot.to_json()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!("Snapshot written to {}", self.path.display());
        Ok(())
    }
}

/// Save a snapshot if the engine changed since `last`. Returns the
/// generation now on disk.
async fn flush_if_changed(engine: &EngagementEngine, store: &dyn SnapshotStore, last: u64) -> u64 {
    let generation = engine.generation();
    if generation == last {
        return last;
    }
    match store.save(&engine.snapshot()).await {
        Ok(()) => generation,
        Err(e) => {
            tracing::warn!("Snapshot flush failed: {}", e);
            last
        }
    }
}

/// Periodically persist the engine until `shutdown` flips to true, then
/// flush once more.
pub fn spawn_flusher(
    engine: Arc<EngagementEngine>,
    store: Arc<dyn SnapshotStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut flushed = engine.generation();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    flushed = flush_if_changed(&engine, store.as_ref(), flushed).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        flush_if_changed(&engine, store.as_ref(), flushed).await;
        tracing::info!("Snapshot flusher stopped");
    })
}
