//! The per-(law, version) correction file store.
//!
//! Layout under the store root: `<law_id>/<version>.json`. Concurrent
//! read-modify-write cycles on the same file are serialized by a per-key
//! mutex; the batch engine additionally routes each (law, version) to exactly
//! one worker, so the lock is a backstop rather than the primary discipline.
//!
//! `reviewed_at`/`reviewer` are stamped only by review saves, never by
//! merges — re-running extraction on unchanged input leaves the file
//! byte-identical on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::migrate;
use super::records::{CorrectionFile, TableRecord, TableStatus};
use super::StoreError;
use crate::extract::DraftTable;
use crate::source::sort_versions;
use crate::validate;

/// Outcome of `create_or_merge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// True if no file existed and one was created.
    pub created: bool,
    /// Hashes inserted as fresh `undefined` records.
    pub added: Vec<String>,
    /// Records present before the merge and left untouched.
    pub retained: usize,
}

impl MergeReport {
    /// True if the merge changed the persisted file.
    pub fn changed(&self) -> bool {
        self.created || !self.added.is_empty()
    }
}

pub struct CorrectionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CorrectionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, law_id: &str, version: &str) -> PathBuf {
        self.root.join(law_id).join(format!("{version}.json"))
    }

    fn key_lock(&self, law_id: &str, version: &str) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(locks
            .entry(format!("{law_id}@{version}"))
            .or_default()
            .clone())
    }

    pub fn exists(&self, law_id: &str, version: &str) -> bool {
        self.file_path(law_id, version).exists()
    }

    /// Load and migrate a correction file. Validation happens on save, not
    /// here — `reset` must be able to load files a newer build marked invalid.
    pub fn load(&self, law_id: &str, version: &str) -> Result<CorrectionFile, StoreError> {
        let path = self.file_path(law_id, version);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    law_id: law_id.to_string(),
                    version: version.to_string(),
                });
            }
            Err(e) => return Err(StoreError::Persistence(e)),
        };

        let mut value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;

        if migrate::migrate_value(&mut value) {
            tracing::info!(law_id, version, "migrated legacy correction file");
        }

        serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    /// Merge freshly extracted drafts into the stored file, creating it if
    /// absent.
    ///
    /// Existing records always win over fresh extraction: a draft whose hash
    /// is already present changes nothing, and records the new draft set no
    /// longer contains are retained unchanged. Only genuinely new hashes are
    /// inserted, as `undefined`. The file is rewritten only when something
    /// changed.
    pub fn create_or_merge(
        &self,
        law_id: &str,
        version: &str,
        drafts: &[DraftTable],
    ) -> Result<(CorrectionFile, MergeReport), StoreError> {
        let lock = self.key_lock(law_id, version)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let (mut file, created) = match self.load(law_id, version) {
            Ok(file) => (file, false),
            Err(StoreError::NotFound { .. }) => (CorrectionFile::new(law_id, version), true),
            Err(e) => return Err(e),
        };

        let mut added = Vec::new();
        for draft in drafts {
            if !file.tables.contains_key(&draft.hash) {
                file.tables
                    .insert(draft.hash.clone(), TableRecord::from_draft(draft, version));
                added.push(draft.hash.clone());
            }
        }
        let retained = file.tables.len() - added.len();

        let report = MergeReport {
            created,
            added,
            retained,
        };

        if report.changed() {
            file.recompute_status();
            self.write(law_id, version, &file)?;
            tracing::info!(
                law_id,
                version,
                added = report.added.len(),
                retained = report.retained,
                created = report.created,
                "merged extraction into correction file"
            );
        } else {
            tracing::debug!(law_id, version, "no-op merge, file unchanged");
        }

        Ok((file, report))
    }

    /// Validate and persist review decisions, stamping `reviewed_at` and
    /// `reviewer`. On validation failure nothing is written and the prior
    /// on-disk state stays authoritative.
    pub fn save(
        &self,
        law_id: &str,
        version: &str,
        mut file: CorrectionFile,
        reviewer: &str,
    ) -> Result<CorrectionFile, StoreError> {
        let lock = self.key_lock(law_id, version)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        file.recompute_status();
        validate::validate_file(&file)?;

        file.reviewed_at = Some(Utc::now());
        file.reviewer = Some(reviewer.to_string());
        self.write(law_id, version, &file)?;

        tracing::info!(
            law_id,
            version,
            status = file.status.as_str(),
            tables = file.tables.len(),
            "saved correction file"
        );
        Ok(file)
    }

    /// Dedicated transition returning a `merged` record to `undefined`
    /// without touching its former target.
    pub fn unmerge(
        &self,
        law_id: &str,
        version: &str,
        hash: &str,
    ) -> Result<CorrectionFile, StoreError> {
        let lock = self.key_lock(law_id, version)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut file = self.load(law_id, version)?;
        let record = file
            .tables
            .get_mut(hash)
            .ok_or_else(|| StoreError::RecordNotFound {
                law_id: law_id.to_string(),
                version: version.to_string(),
                hash: hash.to_string(),
            })?;
        if record.status != TableStatus::Merged {
            return Err(StoreError::NotMerged {
                law_id: law_id.to_string(),
                version: version.to_string(),
                hash: hash.to_string(),
            });
        }

        record.status = TableStatus::Undefined;
        record.merged_into = None;
        record.reason = None;

        file.recompute_status();
        file.reviewed_at = Some(Utc::now());
        self.write(law_id, version, &file)?;

        tracing::info!(law_id, version, hash, "unmerged record");
        Ok(file)
    }

    /// Return every record in the file to `undefined`, keeping structures and
    /// provenance. Hash entries are never deleted. Returns the number of
    /// records that were actually reset.
    pub fn reset_file(&self, law_id: &str, version: &str) -> Result<usize, StoreError> {
        let lock = self.key_lock(law_id, version)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut file = self.load(law_id, version)?;
        let mut reset = 0;
        for record in file.tables.values_mut() {
            if record.status.is_resolved() {
                record.reset();
                reset += 1;
            }
        }
        file.reviewed_at = None;
        file.reviewer = None;
        file.recompute_status();
        self.write(law_id, version, &file)?;

        tracing::info!(law_id, version, reset, "reset correction file");
        Ok(reset)
    }

    /// Delete the persisted file so the next extraction starts from scratch.
    /// Destructive; `reset_file` is the non-destructive counterpart.
    pub fn remove(&self, law_id: &str, version: &str) -> Result<(), StoreError> {
        let lock = self.key_lock(law_id, version)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let path = self.file_path(law_id, version);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::warn!(law_id, version, "discarded correction file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                law_id: law_id.to_string(),
                version: version.to_string(),
            }),
            Err(e) => Err(StoreError::Persistence(e)),
        }
    }

    /// Laws with at least one correction file, sorted.
    pub fn list_laws(&self) -> Result<Vec<String>, StoreError> {
        let mut laws = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(laws),
            Err(e) => return Err(StoreError::Persistence(e)),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                laws.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        laws.sort();
        Ok(laws)
    }

    /// Versions of one law with a correction file, in version order.
    pub fn list_versions(&self, law_id: &str) -> Result<Vec<String>, StoreError> {
        let mut versions = Vec::new();
        let entries = match std::fs::read_dir(self.root.join(law_id)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(StoreError::Persistence(e)),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(version) = name.strip_suffix(".json") {
                versions.push(version.to_string());
            }
        }
        sort_versions(&mut versions);
        Ok(versions)
    }

    fn write(&self, law_id: &str, version: &str, file: &CorrectionFile) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(file)?;
        bytes.push(b'\n');
        super::write_atomic(&self.file_path(law_id, version), &bytes)?;
        Ok(())
    }
}
