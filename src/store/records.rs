//! Persisted record types for the correction lifecycle.
//!
//! One `CorrectionFile` per (law, version) holds a `TableRecord` per content
//! hash. Records are created `undefined` when a hash is first observed and are
//! only ever transitioned or reset, never deleted — tables do not vanish from
//! history even when a later extraction fails to find them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::DraftTable;

/// Current on-disk format. Files without a `format_version` field are legacy
/// (version 0) and go through `migrate` on load.
pub const FORMAT_VERSION: u32 = 1;

// ═══════════════════════════════════════════
// Table status
// ═══════════════════════════════════════════

/// Review disposition of a single table. `Undefined` is the initial state;
/// the others are terminal but reversible via reset or unmerge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Undefined,
    ConfirmedWithoutChanges,
    ConfirmedWithChanges,
    Rejected,
    Merged,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::ConfirmedWithoutChanges => "confirmed_without_changes",
            Self::ConfirmedWithChanges => "confirmed_with_changes",
            Self::Rejected => "rejected",
            Self::Merged => "merged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "undefined" => Some(Self::Undefined),
            "confirmed_without_changes" => Some(Self::ConfirmedWithoutChanges),
            "confirmed_with_changes" => Some(Self::ConfirmedWithChanges),
            "rejected" => Some(Self::Rejected),
            "merged" => Some(Self::Merged),
            _ => None,
        }
    }

    pub fn all() -> &'static [TableStatus] {
        &[
            Self::Undefined,
            Self::ConfirmedWithoutChanges,
            Self::ConfirmedWithChanges,
            Self::Rejected,
            Self::Merged,
        ]
    }

    /// True once a reviewer has decided anything at all.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Undefined)
    }
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// File status
// ═══════════════════════════════════════════

/// Completion state of a correction file. Derived: `Completed` iff no record
/// is `undefined`. Recomputed by the store on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    InProgress,
    Completed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Table record
// ═══════════════════════════════════════════

/// Review record for one content-identified table.
///
/// `original_structure` is immutable once written; only `regenerate` (which
/// discards the whole file) rebuilds it. BTree containers keep serialization
/// deterministic so an unchanged file re-serializes byte-identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub hash: String,
    pub status: TableStatus,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub found_in_versions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pages: BTreeMap<String, Vec<u32>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pdf_paths: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_links: BTreeMap<String, String>,
    pub original_structure: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_structure: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub has_header: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TableRecord {
    /// Build the initial `undefined` record for a freshly extracted draft.
    pub fn from_draft(draft: &DraftTable, version: &str) -> Self {
        let mut found_in_versions = BTreeSet::new();
        found_in_versions.insert(version.to_string());
        let mut pages = BTreeMap::new();
        pages.insert(version.to_string(), draft.pages.clone());

        Self {
            hash: draft.hash.clone(),
            status: TableStatus::Undefined,
            found_in_versions,
            pages,
            pdf_paths: BTreeMap::new(),
            source_links: BTreeMap::new(),
            original_structure: draft.structure.clone(),
            corrected_structure: None,
            has_header: draft.has_header,
            merged_into: None,
            reason: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Return the record to `undefined`, dropping the review decision but
    /// keeping structure and provenance.
    pub fn reset(&mut self) {
        self.status = TableStatus::Undefined;
        self.corrected_structure = None;
        self.merged_into = None;
        self.reason = None;
    }
}

// ═══════════════════════════════════════════
// Correction file
// ═══════════════════════════════════════════

/// The persisted per-(law, version) record of review decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionFile {
    #[serde(default)]
    pub format_version: u32,
    pub law_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    pub status: FileStatus,
    pub tables: BTreeMap<String, TableRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CorrectionFile {
    pub fn new(law_id: &str, version: &str) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            law_id: law_id.to_string(),
            version: version.to_string(),
            reviewed_at: None,
            reviewer: None,
            status: FileStatus::InProgress,
            tables: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Hashes still awaiting a review decision, in key order.
    pub fn undefined_hashes(&self) -> Vec<String> {
        self.tables
            .values()
            .filter(|r| r.status == TableStatus::Undefined)
            .map(|r| r.hash.clone())
            .collect()
    }

    /// True iff no contained record is `undefined`.
    pub fn is_complete(&self) -> bool {
        self.tables
            .values()
            .all(|r| r.status != TableStatus::Undefined)
    }

    /// Re-derive `status` from the contained records.
    pub fn recompute_status(&mut self) {
        self.status = if self.is_complete() {
            FileStatus::Completed
        } else {
            FileStatus::InProgress
        };
    }

    pub fn count_by_status(&self, status: TableStatus) -> usize {
        self.tables.values().filter(|r| r.status == status).count()
    }
}
