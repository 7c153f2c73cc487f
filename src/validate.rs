//! Field invariants of the review state machine.
//!
//! Checked by the store before any save is accepted; a failing save is
//! rejected wholesale and the prior on-disk state stays authoritative. The
//! rules per status:
//! - `confirmed_with_changes` requires a non-empty `corrected_structure` that
//!   differs from `original_structure` (edits must be real)
//! - `merged` requires `merged_into` to name an existing, non-merged record in
//!   the same file (no chains, no self-reference)
//! - every other status carries neither field

use thiserror::Error;

use crate::store::records::{CorrectionFile, TableRecord, TableStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record {hash}: original_structure is empty")]
    EmptyOriginalStructure { hash: String },

    #[error("record {hash}: corrected_structure is required for confirmed_with_changes")]
    MissingCorrectedStructure { hash: String },

    #[error("record {hash}: corrected_structure has no content")]
    EmptyCorrectedStructure { hash: String },

    #[error("record {hash}: corrected_structure equals original_structure; edits must change content")]
    UnchangedCorrection { hash: String },

    #[error("record {hash}: corrected_structure is only valid with confirmed_with_changes")]
    UnexpectedCorrectedStructure { hash: String },

    #[error("record {hash}: merged_into is required for merged")]
    MissingMergeTarget { hash: String },

    #[error("record {hash}: merged_into is only valid with merged")]
    UnexpectedMergeTarget { hash: String },

    #[error("record {hash} names itself as merge target")]
    SelfMerge { hash: String },

    #[error("record {hash}: merge target {target} does not exist in this file")]
    UnknownMergeTarget { hash: String, target: String },

    #[error("record {hash}: merge target {target} is itself merged; merge chains are not allowed")]
    ChainedMerge { hash: String, target: String },

    #[error("table key {key} does not match record hash {hash}")]
    KeyHashMismatch { key: String, hash: String },
}

/// Check one record's field contract, ignoring cross-record rules.
pub fn validate_record(record: &TableRecord) -> Result<(), ValidationError> {
    if record.original_structure.is_empty() {
        return Err(ValidationError::EmptyOriginalStructure {
            hash: record.hash.clone(),
        });
    }

    match record.status {
        TableStatus::ConfirmedWithChanges => {
            let corrected = record.corrected_structure.as_ref().ok_or_else(|| {
                ValidationError::MissingCorrectedStructure {
                    hash: record.hash.clone(),
                }
            })?;
            if corrected.is_empty() || corrected.iter().all(|row| row.is_empty()) {
                return Err(ValidationError::EmptyCorrectedStructure {
                    hash: record.hash.clone(),
                });
            }
            if *corrected == record.original_structure {
                return Err(ValidationError::UnchangedCorrection {
                    hash: record.hash.clone(),
                });
            }
        }
        _ => {
            if record.corrected_structure.is_some() {
                return Err(ValidationError::UnexpectedCorrectedStructure {
                    hash: record.hash.clone(),
                });
            }
        }
    }

    match record.status {
        TableStatus::Merged => {
            let target = record.merged_into.as_ref().ok_or_else(|| {
                ValidationError::MissingMergeTarget {
                    hash: record.hash.clone(),
                }
            })?;
            if *target == record.hash {
                return Err(ValidationError::SelfMerge {
                    hash: record.hash.clone(),
                });
            }
        }
        _ => {
            if record.merged_into.is_some() {
                return Err(ValidationError::UnexpectedMergeTarget {
                    hash: record.hash.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Check every record plus the cross-record rules (key agreement and merge
/// targets).
pub fn validate_file(file: &CorrectionFile) -> Result<(), ValidationError> {
    for (key, record) in &file.tables {
        if *key != record.hash {
            return Err(ValidationError::KeyHashMismatch {
                key: key.clone(),
                hash: record.hash.clone(),
            });
        }
        validate_record(record)?;

        if record.status == TableStatus::Merged {
            // merged_into presence was checked per-record
            if let Some(target) = &record.merged_into {
                match file.tables.get(target) {
                    None => {
                        return Err(ValidationError::UnknownMergeTarget {
                            hash: record.hash.clone(),
                            target: target.clone(),
                        });
                    }
                    Some(t) if t.status == TableStatus::Merged => {
                        return Err(ValidationError::ChainedMerge {
                            hash: record.hash.clone(),
                            target: target.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Ok(())
}

/// True iff the file contains no `undefined` record.
pub fn validate_law_completion(file: &CorrectionFile) -> bool {
    file.is_complete()
}
