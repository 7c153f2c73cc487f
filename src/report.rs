//! Read-only correction statistics for the reporting collaborator.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::store::records::{FileStatus, TableStatus};
use crate::store::{CorrectionStore, StoreError};

/// Per-(law, version) review statistics.
#[derive(Debug, Clone, Serialize)]
pub struct LawVersionStats {
    pub law_id: String,
    pub version: String,
    pub file_status: FileStatus,
    pub tables: u32,
    pub by_status: BTreeMap<String, u32>,
    pub completion_pct: f64,
}

/// Statistics over every correction file in the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStats {
    pub files: u32,
    pub completed_files: u32,
    pub tables: u32,
    pub resolved_tables: u32,
    pub by_status: BTreeMap<String, u32>,
    pub completion_pct: f64,
}

/// Statistics for one correction file.
pub fn law_stats(
    store: &CorrectionStore,
    law_id: &str,
    version: &str,
) -> Result<LawVersionStats, StoreError> {
    let file = store.load(law_id, version)?;

    let mut by_status = BTreeMap::new();
    for record in file.tables.values() {
        *by_status.entry(record.status.as_str().to_string()).or_insert(0u32) += 1;
    }
    let tables = file.tables.len() as u32;
    let resolved = tables - by_status.get("undefined").copied().unwrap_or(0);

    Ok(LawVersionStats {
        law_id: law_id.to_string(),
        version: version.to_string(),
        file_status: file.status,
        tables,
        by_status,
        completion_pct: percentage(resolved, tables),
    })
}

/// Aggregate statistics over the whole store.
pub fn corpus_stats(store: &CorrectionStore) -> Result<CorpusStats, StoreError> {
    let mut stats = CorpusStats::default();
    for law_id in store.list_laws()? {
        for version in store.list_versions(&law_id)? {
            let per_file = law_stats(store, &law_id, &version)?;
            stats.files += 1;
            if per_file.file_status == FileStatus::Completed {
                stats.completed_files += 1;
            }
            stats.tables += per_file.tables;
            for (status, count) in per_file.by_status {
                *stats.by_status.entry(status).or_insert(0) += count;
            }
        }
    }
    let undefined = stats
        .by_status
        .get(TableStatus::Undefined.as_str())
        .copied()
        .unwrap_or(0);
    stats.resolved_tables = stats.tables - undefined;
    stats.completion_pct = percentage(stats.resolved_tables, stats.tables);
    Ok(stats)
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        100.0
    } else {
        f64::from(part) / f64::from(whole) * 100.0
    }
}
