//! Run ids and state stores
//!
//! Two [`StateStore`] implementations:
//! - [`JsonFileStore`]: pretty JSON snapshot per run at `<dir>/<run_id>.json`
//! - [`MemoryStore`]: in-process map, for embedding and tests

use crate::collaborators::StateStore;
use crate::error::PersistError;
use crate::state::ResearchState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hex characters of the topic hash kept in a run id
const HASH_SUFFIX_LEN: usize = 8;

/// Deterministic, filesystem-safe run identifier derived from a topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Derive the run id for a topic
    ///
    /// Sanitized topic plus a short blake3 hash of the raw topic, so topics
    /// that sanitize identically still get distinct ids.
    #[must_use]
    pub fn for_topic(topic: &str) -> Self {
        let mut slug = sanitize(topic);
        if slug.is_empty() {
            slug.push_str("untitled");
        }
        let hash = blake3::hash(topic.as_bytes());
        let suffix = hex::encode(&hash.as_bytes()[..HASH_SUFFIX_LEN / 2]);
        Self(format!("{slug}-{suffix}"))
    }

    /// As string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep alphanumerics, `-` and `_`, lowercased
#[must_use]
pub fn sanitize(topic: &str) -> String {
    topic
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

/// On-disk snapshot envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Run id the snapshot belongs to
    pub run_id: RunId,
    /// When it was written
    pub saved_at: DateTime<Utc>,
    /// Whether the state carries a final report
    pub complete: bool,
    /// The state itself
    pub state: ResearchState,
}

/// Pretty JSON snapshots in a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create store rooted at `dir`; created on first save
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for a run
    #[must_use]
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Load the full snapshot envelope
    pub async fn load_snapshot(&self, run_id: &RunId) -> Result<Option<Snapshot>, PersistError> {
        let path = self.path_for(run_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn save(&self, run_id: &RunId, state: &ResearchState) -> Result<(), PersistError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let snapshot = Snapshot {
            run_id: run_id.clone(),
            saved_at: Utc::now(),
            complete: state.is_complete(),
            state: state.clone(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        // Write-then-rename so a crash never leaves a truncated snapshot
        let path = self.path_for(run_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(%run_id, path = %path.display(), "state saved");
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<ResearchState>, PersistError> {
        Ok(self.load_snapshot(run_id).await?.map(|s| s.state))
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: RwLock<HashMap<RunId, ResearchState>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest state for a run
    #[must_use]
    pub fn get(&self, run_id: &RunId) -> Option<ResearchState> {
        self.states.read().get(run_id).cloned()
    }

    /// Total saves performed, across runs
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save(&self, run_id: &RunId, state: &ResearchState) -> Result<(), PersistError> {
        self.states.write().insert(run_id.clone(), state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<ResearchState>, PersistError> {
        Ok(self.get(run_id))
    }
}
