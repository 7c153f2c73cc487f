//! Durable batch checkpoints.
//!
//! One progress record per batch scope, persisted atomically after every
//! item transition. Resume reloads the record and skips items already in
//! `completed_item_ids`; failed items are retried.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::BatchError;
use crate::store::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Checkpoint record for one batch run over one scope.
///
/// Invariant: `completed_item_ids` and `failed_items` keys are disjoint, and
/// together never exceed `total_items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub scope_key: String,
    pub total_items: u32,
    #[serde(default)]
    pub completed_item_ids: BTreeSet<String>,
    /// Failed item ids with the reason recorded at failure time.
    #[serde(default)]
    pub failed_items: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub status: BatchStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BatchProgress {
    pub fn new(scope_key: &str, total_items: u32) -> Self {
        let now = Utc::now();
        Self {
            batch_id: Uuid::new_v4().to_string(),
            scope_key: scope_key.to_string(),
            total_items,
            completed_item_ids: BTreeSet::new(),
            failed_items: BTreeMap::new(),
            current_item: None,
            start_time: now,
            last_update: now,
            status: BatchStatus::Running,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_completed_item(&self, item_id: &str) -> bool {
        self.completed_item_ids.contains(item_id)
    }

    pub fn record_started(&mut self, item_id: &str) {
        self.current_item = Some(item_id.to_string());
        self.last_update = Utc::now();
    }

    /// Mark an item done. A previous failure of the same item (from an
    /// earlier run) is cleared so the disjointness invariant holds.
    pub fn record_completed(&mut self, item_id: &str) {
        self.failed_items.remove(item_id);
        self.completed_item_ids.insert(item_id.to_string());
        if self.current_item.as_deref() == Some(item_id) {
            self.current_item = None;
        }
        self.last_update = Utc::now();
    }

    pub fn record_failed(&mut self, item_id: &str, reason: &str) {
        if !self.completed_item_ids.contains(item_id) {
            self.failed_items
                .insert(item_id.to_string(), reason.to_string());
        }
        if self.current_item.as_deref() == Some(item_id) {
            self.current_item = None;
        }
        self.last_update = Utc::now();
    }

    pub fn finish(&mut self) {
        self.status = BatchStatus::Completed;
        self.current_item = None;
        self.last_update = Utc::now();
    }

    pub fn completed_count(&self) -> u32 {
        self.completed_item_ids.len() as u32
    }

    pub fn failed_count(&self) -> u32 {
        self.failed_items.len() as u32
    }
}

/// File-backed progress persistence, one record per scope key.
pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, scope_key: &str) -> PathBuf {
        self.root.join(format!("batch-{scope_key}.json"))
    }

    /// Load the last progress record for a scope, if any.
    pub fn load(&self, scope_key: &str) -> Result<Option<BatchProgress>, BatchError> {
        let path = self.path(scope_key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BatchError::Persistence(e)),
        };
        let progress =
            serde_json::from_slice(&bytes).map_err(|e| BatchError::CorruptProgress {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        Ok(Some(progress))
    }

    pub fn save(&self, progress: &BatchProgress) -> Result<(), BatchError> {
        let mut bytes = serde_json::to_vec_pretty(progress)?;
        bytes.push(b'\n');
        write_atomic(&self.path(&progress.scope_key), &bytes)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
