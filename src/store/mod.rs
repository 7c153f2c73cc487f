//! Correction persistence — records, store, and legacy migration.
//!
//! All state is local file-backed JSON. Writes go through a temp-file-then-
//! rename sequence so a crash mid-write never corrupts the previous valid
//! file.

pub mod correction_store;
pub mod migrate;
pub mod records;

use std::io::Write;
use std::path::Path;

use thiserror::Error;

pub use correction_store::{CorrectionStore, MergeReport};
pub use records::{CorrectionFile, FileStatus, TableRecord, TableStatus};

use crate::validate::ValidationError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no correction file for {law_id}@{version}")]
    NotFound { law_id: String, version: String },

    #[error("correction file {path} is corrupt: {detail}")]
    Corrupt { path: String, detail: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("record {hash} not found in {law_id}@{version}")]
    RecordNotFound {
        law_id: String,
        version: String,
        hash: String,
    },

    #[error("record {hash} in {law_id}@{version} is not merged")]
    NotMerged {
        law_id: String,
        version: String,
        hash: String,
    },

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("encoding correction data: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Write `bytes` to `path` atomically: stage in a temp file in the target
/// directory, fsync, then rename over the destination. On any failure the
/// previous file is left untouched.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
