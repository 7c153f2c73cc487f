//! Table extraction — one version's element stream in, draft tables out.
//!
//! Cells are grouped by the extractor-assigned group id in stream order, the
//! matrix is rebuilt from the row/column indices each cell carries, and cell
//! text is canonicalized before the content hash is computed. Extraction is
//! strictly per-version: cross-run grouping noise makes cross-version identity
//! unreliable, so identity never reaches beyond one version's correction file.

pub mod hash;

use std::collections::HashMap;

use thiserror::Error;

use crate::elements::{DocElement, ElementKind};

/// Upper bound on either table dimension. Indices beyond this are treated as
/// extractor garbage rather than allocated.
const MAX_DIMENSION: u32 = 4096;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no element stream for {law_id}@{version}")]
    VersionNotFound { law_id: String, version: String },

    #[error("element stream for {law_id}@{version} is malformed: {detail}")]
    MalformedInput {
        law_id: String,
        version: String,
        detail: String,
    },

    #[error("table cell at stream position {position} has no cell metadata")]
    MissingCellMeta { position: u32 },

    #[error("table group {group_id} exceeds the table dimension limit")]
    OversizedGroup { group_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A candidate table reconstructed from one version's stream, prior to any
/// review decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftTable {
    /// Content hash of `structure`; the table's identity within its file.
    pub hash: String,
    /// Extraction-run group id. Valid only within the stream it came from.
    pub group_id: String,
    /// Canonicalized cell matrix.
    pub structure: Vec<Vec<String>>,
    /// Pages the table's cells were found on, ascending and deduplicated.
    pub pages: Vec<u32>,
    pub has_header: bool,
}

struct GroupAccumulator {
    group_id: String,
    cells: Vec<(u32, u32, String)>,
    pages: Vec<u32>,
    has_header: bool,
    max_row: u32,
    max_col: u32,
}

impl GroupAccumulator {
    fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            cells: Vec::new(),
            pages: Vec::new(),
            has_header: false,
            max_row: 0,
            max_col: 0,
        }
    }

    fn into_draft(mut self) -> Result<DraftTable, ExtractError> {
        if self.max_row >= MAX_DIMENSION || self.max_col >= MAX_DIMENSION {
            return Err(ExtractError::OversizedGroup {
                group_id: self.group_id,
            });
        }

        let rows = self.max_row as usize + 1;
        let cols = self.max_col as usize + 1;
        let mut structure = vec![vec![String::new(); cols]; rows];
        // Later cells win on index collisions, matching stream order.
        for (row, col, text) in self.cells {
            structure[row as usize][col as usize] = text;
        }

        self.pages.sort_unstable();
        self.pages.dedup();

        Ok(DraftTable {
            hash: hash::table_hash(&structure),
            group_id: self.group_id,
            structure,
            pages: self.pages,
            has_header: self.has_header,
        })
    }
}

/// Reconstruct all draft tables from one version's ordered element stream.
///
/// Group order follows first appearance in the stream. Index gaps become
/// empty cells so the matrix stays rectangular.
pub fn extract_tables(elements: &[DocElement]) -> Result<Vec<DraftTable>, ExtractError> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, GroupAccumulator> = HashMap::new();

    for element in elements {
        if element.kind != ElementKind::TableCell {
            continue;
        }
        let meta = element
            .table
            .as_ref()
            .ok_or(ExtractError::MissingCellMeta {
                position: element.position,
            })?;

        let acc = groups.entry(meta.group_id.clone()).or_insert_with(|| {
            order.push(meta.group_id.clone());
            GroupAccumulator::new(&meta.group_id)
        });

        acc.max_row = acc.max_row.max(meta.row);
        acc.max_col = acc.max_col.max(meta.col);
        acc.cells
            .push((meta.row, meta.col, hash::canonicalize_cell(&element.text)));
        acc.pages.push(element.page);
        if meta.is_header && meta.row == 0 {
            acc.has_header = true;
        }
    }

    let mut drafts = Vec::with_capacity(order.len());
    for group_id in order {
        if let Some(acc) = groups.remove(&group_id) {
            drafts.push(acc.into_draft()?);
        }
    }

    tracing::debug!(tables = drafts.len(), "reconstructed draft tables");
    Ok(drafts)
}
