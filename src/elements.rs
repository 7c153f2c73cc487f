//! Document element stream consumed from the extraction collaborator.
//!
//! A version's content arrives as an ordered list of typed elements. Table
//! cells carry grouping metadata (`TableCellMeta`) linking them to the table
//! they belong to; everything else is opaque to the correction engine and is
//! passed through untouched by the applier.

use serde::{Deserialize, Serialize};

/// Element kinds the correction engine distinguishes. Anything the upstream
/// extractor emits beyond these is mapped to `Unknown` and passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Paragraph,
    Heading,
    TableCell,
    #[serde(other)]
    Unknown,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::TableCell => "table_cell",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grouping metadata carried by table-cell elements.
///
/// `group_id` ties cells of one table together within a single version's
/// stream; it is an extraction-run artifact and never used as cross-run
/// identity (content hashes are).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCellMeta {
    pub group_id: String,
    pub row: u32,
    pub col: u32,
    #[serde(default)]
    pub is_header: bool,
}

/// One element of a version's ordered stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocElement {
    pub kind: ElementKind,
    pub text: String,
    pub page: u32,
    /// Position within the stream, as assigned by the upstream extractor.
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableCellMeta>,
    /// Fields we do not model. Preserved across load/save so newer upstream
    /// output survives a round trip through older builds.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocElement {
    /// Build a plain paragraph element, as emitted by the applier when a
    /// rejected table is flattened back into prose.
    pub fn paragraph(text: impl Into<String>, page: u32, position: u32) -> Self {
        Self {
            kind: ElementKind::Paragraph,
            text: text.into(),
            page,
            position,
            table: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Build a table-cell element.
    pub fn table_cell(
        text: impl Into<String>,
        page: u32,
        position: u32,
        group_id: impl Into<String>,
        row: u32,
        col: u32,
    ) -> Self {
        Self {
            kind: ElementKind::TableCell,
            text: text.into(),
            page,
            position,
            table: Some(TableCellMeta {
                group_id: group_id.into(),
                row,
                col,
                is_header: false,
            }),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_table_cell(&self) -> bool {
        self.kind == ElementKind::TableCell
    }
}
