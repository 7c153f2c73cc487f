//! Render-time application of stored dispositions.
//!
//! The applier rewrites one version's element stream according to its
//! correction file. It is fail-open: missing, corrupt, or incomplete
//! correction data must never fail the overall render, so every problem
//! degrades to passing elements through unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::elements::DocElement;
use crate::extract::{extract_tables, DraftTable};
use crate::store::records::{CorrectionFile, TableStatus};
use crate::store::{CorrectionStore, StoreError};

/// What the applier did to one stream, for render logs and reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedInfo {
    pub law_id: String,
    pub version: String,
    /// A correction file was present and readable.
    pub corrections_found: bool,
    /// Tables passed through unchanged (confirmed without changes, or still
    /// undefined).
    pub passed_through: u32,
    /// Tables whose cells were substituted from `corrected_structure`.
    pub substituted: u32,
    /// Rejected tables flattened to paragraphs.
    pub flattened: u32,
    /// Merged tables removed from the stream.
    pub removed: u32,
    /// Tables in the stream with no record in the file (identity drift).
    pub unknown_tables: u32,
}

enum TableAction {
    PassThrough,
    Substitute(Vec<Vec<String>>),
    Flatten,
    Remove,
}

pub struct CorrectionApplier {
    store: Arc<CorrectionStore>,
}

impl CorrectionApplier {
    pub fn new(store: Arc<CorrectionStore>) -> Self {
        Self { store }
    }

    /// Rewrite `elements` according to the stored dispositions for
    /// (law, version). Never fails; problems degrade to pass-through.
    pub fn apply(
        &self,
        elements: Vec<DocElement>,
        law_id: &str,
        version: &str,
    ) -> (Vec<DocElement>, AppliedInfo) {
        let mut info = AppliedInfo {
            law_id: law_id.to_string(),
            version: version.to_string(),
            ..AppliedInfo::default()
        };

        let file = match self.store.load(law_id, version) {
            Ok(file) => file,
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!(law_id, version, "no correction file, rendering as-is");
                return (elements, info);
            }
            Err(e) => {
                tracing::warn!(law_id, version, error = %e, "correction file unreadable, rendering as-is");
                return (elements, info);
            }
        };
        info.corrections_found = true;

        let drafts = match extract_tables(&elements) {
            Ok(drafts) => drafts,
            Err(e) => {
                tracing::warn!(law_id, version, error = %e, "stream not groupable, rendering as-is");
                return (elements, info);
            }
        };

        let (actions, draft_by_group) = plan_actions(&drafts, &file, &mut info);
        let rewritten = rewrite(elements, &actions, &draft_by_group);
        (rewritten, info)
    }
}

fn plan_actions<'a>(
    drafts: &'a [DraftTable],
    file: &CorrectionFile,
    info: &mut AppliedInfo,
) -> (
    HashMap<&'a str, TableAction>,
    HashMap<&'a str, &'a DraftTable>,
) {
    let mut actions = HashMap::new();
    let mut draft_by_group = HashMap::new();

    for draft in drafts {
        draft_by_group.insert(draft.group_id.as_str(), draft);
        let action = match file.tables.get(&draft.hash) {
            None => {
                info.unknown_tables += 1;
                info.passed_through += 1;
                TableAction::PassThrough
            }
            Some(record) => match record.status {
                TableStatus::Undefined | TableStatus::ConfirmedWithoutChanges => {
                    info.passed_through += 1;
                    TableAction::PassThrough
                }
                TableStatus::ConfirmedWithChanges => match &record.corrected_structure {
                    Some(corrected) => {
                        info.substituted += 1;
                        TableAction::Substitute(corrected.clone())
                    }
                    // Should not pass validation; fail open anyway.
                    None => {
                        info.passed_through += 1;
                        TableAction::PassThrough
                    }
                },
                TableStatus::Rejected => {
                    info.flattened += 1;
                    TableAction::Flatten
                }
                // The merged table's content was folded into its target
                // during review; its elements just disappear here.
                TableStatus::Merged => {
                    info.removed += 1;
                    TableAction::Remove
                }
            },
        };
        actions.insert(draft.group_id.as_str(), action);
    }

    (actions, draft_by_group)
}

fn rewrite(
    elements: Vec<DocElement>,
    actions: &HashMap<&str, TableAction>,
    draft_by_group: &HashMap<&str, &DraftTable>,
) -> Vec<DocElement> {
    let mut out = Vec::with_capacity(elements.len());
    let mut flattened_groups: Vec<String> = Vec::new();

    for mut element in elements {
        let (group_id, row, col) = match element.table.as_ref() {
            Some(meta) if element.is_table_cell() => {
                (meta.group_id.clone(), meta.row, meta.col)
            }
            _ => {
                out.push(element);
                continue;
            }
        };

        match actions.get(group_id.as_str()) {
            None | Some(TableAction::PassThrough) => out.push(element),
            Some(TableAction::Substitute(corrected)) => {
                if let Some(text) = corrected
                    .get(row as usize)
                    .and_then(|row| row.get(col as usize))
                {
                    element.text = text.clone();
                }
                out.push(element);
            }
            Some(TableAction::Flatten) => {
                if flattened_groups.iter().any(|g| g == &group_id) {
                    continue;
                }
                flattened_groups.push(group_id.clone());
                if let Some(draft) = draft_by_group.get(group_id.as_str()) {
                    for cells in &draft.structure {
                        let text = cells
                            .iter()
                            .filter(|cell| !cell.is_empty())
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(" ");
                        if !text.is_empty() {
                            out.push(DocElement::paragraph(text, element.page, element.position));
                        }
                    }
                }
            }
            Some(TableAction::Remove) => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::ElementKind;
    use crate::store::records::TableStatus;

    fn fixture() -> (tempfile::TempDir, Arc<CorrectionStore>, CorrectionApplier) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CorrectionStore::new(dir.path().join("corrections")));
        let applier = CorrectionApplier::new(store.clone());
        (dir, store, applier)
    }

    fn sample_stream() -> Vec<DocElement> {
        vec![
            DocElement::paragraph("Art. 1 Gebühren", 1, 0),
            DocElement::table_cell("Leistung", 1, 1, "t1", 0, 0),
            DocElement::table_cell("Betrag", 1, 2, "t1", 0, 1),
            DocElement::table_cell("Auszug", 1, 3, "t1", 1, 0),
            DocElement::table_cell("20 Fr.", 1, 4, "t1", 1, 1),
            DocElement::paragraph("Art. 2", 1, 5),
        ]
    }

    fn seed(store: &CorrectionStore, elements: &[DocElement]) -> String {
        let drafts = extract_tables(elements).unwrap();
        store.create_or_merge("170.4", "118", &drafts).unwrap();
        drafts[0].hash.clone()
    }

    fn set_status(
        store: &CorrectionStore,
        hash: &str,
        status: TableStatus,
        corrected: Option<Vec<Vec<String>>>,
    ) {
        let mut file = store.load("170.4", "118").unwrap();
        {
            let record = file.tables.get_mut(hash).unwrap();
            record.status = status;
            record.corrected_structure = corrected;
            if status == TableStatus::Rejected {
                record.reason = Some("test".to_string());
            }
        }
        store.save("170.4", "118", file, "tester").unwrap();
    }

    #[test]
    fn missing_file_passes_through() {
        let (_dir, _store, applier) = fixture();
        let elements = sample_stream();
        let (out, info) = applier.apply(elements.clone(), "170.4", "118");
        assert_eq!(out, elements);
        assert!(!info.corrections_found);
    }

    #[test]
    fn corrupt_file_fails_open() {
        let (_dir, store, applier) = fixture();
        let path = store.root().join("170.4").join("118.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ nope").unwrap();

        let elements = sample_stream();
        let (out, info) = applier.apply(elements.clone(), "170.4", "118");
        assert_eq!(out, elements);
        assert!(!info.corrections_found);
    }

    #[test]
    fn confirmed_table_passes_through() {
        let (_dir, store, applier) = fixture();
        let elements = sample_stream();
        let hash = seed(&store, &elements);
        set_status(&store, &hash, TableStatus::ConfirmedWithoutChanges, None);

        let (out, info) = applier.apply(elements.clone(), "170.4", "118");
        assert_eq!(out, elements);
        assert_eq!(info.passed_through, 1);
        assert!(info.corrections_found);
    }

    #[test]
    fn undefined_table_passes_through() {
        let (_dir, store, applier) = fixture();
        let elements = sample_stream();
        seed(&store, &elements);

        let (out, info) = applier.apply(elements.clone(), "170.4", "118");
        assert_eq!(out, elements);
        assert_eq!(info.passed_through, 1);
    }

    #[test]
    fn corrected_cells_substituted_into_frame() {
        let (_dir, store, applier) = fixture();
        let elements = sample_stream();
        let hash = seed(&store, &elements);
        set_status(
            &store,
            &hash,
            TableStatus::ConfirmedWithChanges,
            Some(vec![
                vec!["Leistung".to_string(), "Betrag".to_string()],
                vec!["Auszug".to_string(), "25 Fr.".to_string()],
            ]),
        );

        let (out, info) = applier.apply(elements, "170.4", "118");
        assert_eq!(info.substituted, 1);
        let texts: Vec<&str> = out.iter().map(|e| e.text.as_str()).collect();
        assert!(texts.contains(&"25 Fr."));
        assert!(!texts.contains(&"20 Fr."));
        // Frame shape untouched.
        assert_eq!(out.len(), 6);
        assert_eq!(out[4].kind, ElementKind::TableCell);
    }

    #[test]
    fn rejected_table_flattens_to_paragraphs_in_reading_order() {
        let (_dir, store, applier) = fixture();
        let elements = sample_stream();
        let hash = seed(&store, &elements);
        set_status(&store, &hash, TableStatus::Rejected, None);

        let (out, info) = applier.apply(elements, "170.4", "118");
        assert_eq!(info.flattened, 1);
        // 2 surrounding paragraphs + 2 flattened rows.
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|e| e.kind == ElementKind::Paragraph));
        assert_eq!(out[1].text, "Leistung Betrag");
        assert_eq!(out[2].text, "Auszug 20 Fr.");
        assert_eq!(out[1].page, 1);
    }

    #[test]
    fn merged_table_removed_entirely() {
        let (_dir, store, applier) = fixture();
        // Two tables; the second merges into the first.
        let mut elements = sample_stream();
        elements.push(DocElement::table_cell("Duplikat", 2, 6, "t2", 0, 0));
        let drafts = extract_tables(&elements).unwrap();
        store.create_or_merge("170.4", "118", &drafts).unwrap();

        let mut file = store.load("170.4", "118").unwrap();
        let target = drafts[0].hash.clone();
        file.tables.get_mut(&target).unwrap().status = TableStatus::ConfirmedWithoutChanges;
        {
            let record = file.tables.get_mut(&drafts[1].hash).unwrap();
            record.status = TableStatus::Merged;
            record.merged_into = Some(target);
        }
        store.save("170.4", "118", file, "tester").unwrap();

        let (out, info) = applier.apply(elements, "170.4", "118");
        assert_eq!(info.removed, 1);
        assert_eq!(info.passed_through, 1);
        assert!(out.iter().all(|e| e.text != "Duplikat"));
        // The confirmed table's cells are still there.
        assert!(out.iter().any(|e| e.text == "20 Fr."));
    }

    #[test]
    fn unknown_table_passes_through_and_is_counted() {
        let (_dir, store, applier) = fixture();
        let elements = sample_stream();
        seed(&store, &elements);

        // Stream drifts: a table the file has never seen.
        let mut drifted = elements.clone();
        drifted.push(DocElement::table_cell("neu", 3, 9, "t9", 0, 0));

        let (out, info) = applier.apply(drifted.clone(), "170.4", "118");
        assert_eq!(out, drifted);
        assert_eq!(info.unknown_tables, 1);
        assert_eq!(info.passed_through, 2);
    }
}
