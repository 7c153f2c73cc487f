//! Core operations exposed to the CLI/automation collaborator.
//!
//! The CLI layer is a thin adapter over these functions; nothing here parses
//! arguments or prints. Each operation takes a `WorkScope` and isolates
//! per-version failures the same way the batch engine does.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::batch::{BatchConfig, BatchError, BatchOutcome, BatchProcessor, ProgressStore, WorkScope};
use crate::extract::extract_tables;
use crate::report::{law_stats, LawVersionStats};
use crate::review::ReviewerPort;
use crate::source::ElementSource;
use crate::store::{CorrectionStore, StoreError};

/// One item that failed inside a scoped operation.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub reason: String,
}

/// Result of `extract` / `regenerate` over a scope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractSummary {
    pub processed: u32,
    pub tables_added: u32,
    pub failures: Vec<ItemFailure>,
}

/// Result of `reset` over a scope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetSummary {
    pub files: u32,
    pub records_reset: u32,
}

/// Result of `status` over a scope.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub files: Vec<LawVersionStats>,
    pub completed_files: u32,
    pub completion_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub resume: bool,
    pub worker_count: usize,
    pub reviewer_name: String,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self {
            resume: false,
            worker_count: 4,
            reviewer_name: "batch".to_string(),
        }
    }
}

/// Extract (or re-extract) every version in scope and merge the drafts into
/// the store. One version's malformed input fails that version only.
pub fn extract(
    store: &CorrectionStore,
    source: &dyn ElementSource,
    scope: &WorkScope,
) -> Result<ExtractSummary, BatchError> {
    let mut summary = ExtractSummary::default();
    for item in scope.enumerate_source(source)? {
        let result = source
            .elements(&item.law_id, &item.version)
            .map_err(BatchError::from)
            .and_then(|elements| Ok(extract_tables(&elements)?))
            .and_then(|drafts| {
                Ok(store.create_or_merge(&item.law_id, &item.version, &drafts)?)
            });
        match result {
            Ok((_, report)) => {
                summary.processed += 1;
                summary.tables_added += report.added.len() as u32;
            }
            Err(e) => {
                tracing::warn!(item = item.id(), error = %e, "extraction failed");
                summary.failures.push(ItemFailure {
                    item_id: item.id(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(summary)
}

/// Drive review across the scope with a bounded worker pool and durable,
/// resumable progress.
pub fn review(
    store: Arc<CorrectionStore>,
    source: Arc<dyn ElementSource>,
    reviewer: Arc<dyn ReviewerPort>,
    progress_root: PathBuf,
    scope: &WorkScope,
    options: ReviewOptions,
) -> Result<BatchOutcome, BatchError> {
    let processor = BatchProcessor::new(
        store,
        source,
        reviewer,
        ProgressStore::new(progress_root),
        BatchConfig {
            worker_count: options.worker_count,
            reviewer_name: options.reviewer_name,
        },
    );
    processor.run(scope, options.resume)
}

/// Return every record in scope to `undefined`. Non-destructive: structures
/// and hash entries survive.
pub fn reset(store: &CorrectionStore, scope: &WorkScope) -> Result<ResetSummary, StoreError> {
    let mut summary = ResetSummary::default();
    for item in scope.enumerate_store(store)? {
        summary.records_reset += store.reset_file(&item.law_id, &item.version)? as u32;
        summary.files += 1;
    }
    Ok(summary)
}

/// Discard the correction files in scope and re-extract from scratch.
/// Destructive — review decisions in scope are lost.
pub fn regenerate(
    store: &CorrectionStore,
    source: &dyn ElementSource,
    scope: &WorkScope,
) -> Result<ExtractSummary, BatchError> {
    for item in scope.enumerate_store(store)? {
        match store.remove(&item.law_id, &item.version) {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    extract(store, source, scope)
}

/// Completion summary over the correction files in scope.
pub fn status(store: &CorrectionStore, scope: &WorkScope) -> Result<StatusSummary, StoreError> {
    let mut files = Vec::new();
    for item in scope.enumerate_store(store)? {
        files.push(law_stats(store, &item.law_id, &item.version)?);
    }
    let completed_files = files
        .iter()
        .filter(|f| f.file_status == crate::store::records::FileStatus::Completed)
        .count() as u32;
    let tables: u32 = files.iter().map(|f| f.tables).sum();
    let undefined: u32 = files
        .iter()
        .map(|f| f.by_status.get("undefined").copied().unwrap_or(0))
        .sum();
    let completion_pct = if tables == 0 {
        100.0
    } else {
        f64::from(tables - undefined) / f64::from(tables) * 100.0
    };
    Ok(StatusSummary {
        files,
        completed_files,
        completion_pct,
    })
}
