//! The batch review engine.
//!
//! Workers pull (law, version) items off a shared queue and run the
//! per-item sequence extract → create_or_merge → review → save. Item results
//! flow over a channel to the coordinator on the calling thread, which is the
//! only writer of the progress record and persists it after every
//! transition. An error inside one item is recorded with its reason and never
//! halts the pool.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use super::progress::{BatchProgress, ProgressStore};
use super::scope::{WorkItem, WorkScope};
use super::BatchError;
use crate::extract::extract_tables;
use crate::review::{Decision, ReviewRequest, ReviewerPort};
use crate::source::ElementSource;
use crate::store::records::{TableRecord, TableStatus};
use crate::store::CorrectionStore;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Upper bound on concurrently in-flight work items.
    pub worker_count: usize,
    /// Name stamped into `reviewer` on saved correction files.
    pub reviewer_name: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            reviewer_name: "batch".to_string(),
        }
    }
}

/// Result of one batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub progress: BatchProgress,
    /// Items actually dispatched this run.
    pub attempted: u32,
    /// Items skipped because a resumed progress record had them completed.
    pub skipped: u32,
}

enum ItemReport {
    Started(String),
    Completed(String),
    Failed(String, String),
}

pub struct BatchProcessor {
    store: Arc<CorrectionStore>,
    source: Arc<dyn ElementSource>,
    reviewer: Arc<dyn ReviewerPort>,
    progress: ProgressStore,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<CorrectionStore>,
        source: Arc<dyn ElementSource>,
        reviewer: Arc<dyn ReviewerPort>,
        progress: ProgressStore,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            source,
            reviewer,
            progress,
            config,
        }
    }

    /// Run review over every item the scope selects.
    ///
    /// With `resume`, the previous progress record for the same scope is
    /// reloaded and items already completed are skipped; otherwise a fresh
    /// record overwrites any prior one.
    pub fn run(&self, scope: &WorkScope, resume: bool) -> Result<BatchOutcome, BatchError> {
        let scope_key = scope.key();
        let items = scope.enumerate_source(self.source.as_ref())?;

        let mut progress = match resume {
            true => match self.progress.load(&scope_key)? {
                Some(mut prior) => {
                    prior.status = super::BatchStatus::Running;
                    prior.total_items = items.len() as u32;
                    prior.current_item = None;
                    prior
                }
                None => BatchProgress::new(&scope_key, items.len() as u32),
            },
            false => BatchProgress::new(&scope_key, items.len() as u32),
        };

        let pending: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| !progress.is_completed_item(&item.id()))
            .collect();
        let attempted = pending.len() as u32;
        let skipped = progress.total_items - attempted;

        self.progress.save(&progress)?;

        tracing::info!(
            scope = scope_key,
            batch_id = progress.batch_id,
            total = progress.total_items,
            pending = attempted,
            skipped,
            resume,
            "batch review starting"
        );

        if !pending.is_empty() {
            let workers = self.config.worker_count.clamp(1, pending.len());
            let queue = Mutex::new(VecDeque::from(pending));
            let (tx, rx) = mpsc::channel::<ItemReport>();
            let mut persist_err: Option<BatchError> = None;

            std::thread::scope(|s| {
                let queue = &queue;
                for _ in 0..workers {
                    let tx = tx.clone();
                    s.spawn(move || self.worker_loop(queue, tx));
                }
                drop(tx);

                // Single writer of the progress record.
                for report in rx {
                    match report {
                        ItemReport::Started(id) => progress.record_started(&id),
                        ItemReport::Completed(id) => progress.record_completed(&id),
                        ItemReport::Failed(id, reason) => {
                            tracing::warn!(item = id, reason, "batch item failed");
                            progress.record_failed(&id, &reason);
                        }
                    }
                    if let Err(e) = self.progress.save(&progress) {
                        if persist_err.is_none() {
                            persist_err = Some(e);
                        }
                    }
                }
            });

            if let Some(e) = persist_err {
                return Err(e);
            }
        }

        progress.finish();
        self.progress.save(&progress)?;

        tracing::info!(
            scope = scope_key,
            completed = progress.completed_count(),
            failed = progress.failed_count(),
            "batch review finished"
        );

        Ok(BatchOutcome {
            progress,
            attempted,
            skipped,
        })
    }

    fn worker_loop(&self, queue: &Mutex<VecDeque<WorkItem>>, tx: mpsc::Sender<ItemReport>) {
        loop {
            let item = match queue.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => None,
            };
            let Some(item) = item else { break };
            let id = item.id();

            if tx.send(ItemReport::Started(id.clone())).is_err() {
                break;
            }
            let report = match self.process_item(&item) {
                Ok(()) => ItemReport::Completed(id),
                Err(e) => ItemReport::Failed(id, e.to_string()),
            };
            if tx.send(report).is_err() {
                break;
            }
        }
    }

    /// The per-item sequence. Strictly sequential within one item.
    fn process_item(&self, item: &WorkItem) -> Result<(), BatchError> {
        let elements = self.source.elements(&item.law_id, &item.version)?;
        let drafts = extract_tables(&elements)?;
        let (mut file, _report) = self
            .store
            .create_or_merge(&item.law_id, &item.version, &drafts)?;

        let undefined = file.undefined_hashes();
        if undefined.is_empty() {
            return Ok(());
        }

        let mut decided = 0u32;
        for hash in undefined {
            let request = match file.tables.get(&hash) {
                Some(record) => ReviewRequest {
                    law_id: item.law_id.clone(),
                    version: item.version.clone(),
                    hash: hash.clone(),
                    structure: record.original_structure.clone(),
                    pages: record
                        .pages
                        .get(&item.version)
                        .cloned()
                        .unwrap_or_default(),
                    has_header: record.has_header,
                },
                None => continue,
            };

            let decision = self.reviewer.resolve(&request)?;
            if let Some(record) = file.tables.get_mut(&hash) {
                if apply_decision(record, decision) {
                    decided += 1;
                }
            }
        }

        if decided > 0 {
            self.store.save(
                &item.law_id,
                &item.version,
                file,
                &self.config.reviewer_name,
            )?;
        }
        tracing::debug!(item = item.id(), decided, "item reviewed");
        Ok(())
    }
}

/// Write a reviewer decision into a record. Returns false when the decision
/// defers (keeps the record `undefined` and untouched).
fn apply_decision(record: &mut TableRecord, decision: Decision) -> bool {
    if decision.status == TableStatus::Undefined {
        return false;
    }
    record.status = decision.status;
    record.corrected_structure = decision.corrected_structure;
    record.merged_into = decision.merged_into;
    record.reason = decision.reason;
    true
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::elements::DocElement;
    use crate::review::{ReviewError, SimulatedReviewer};
    use crate::source::JsonElementSource;
    use crate::store::records::FileStatus;
    use crate::validate::validate_law_completion;

    struct Fixture {
        _dir: tempfile::TempDir,
        corpus: std::path::PathBuf,
        store: Arc<CorrectionStore>,
        progress_root: std::path::PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let corpus = dir.path().join("elements");
            let store = Arc::new(CorrectionStore::new(dir.path().join("corrections")));
            let progress_root = dir.path().join("progress");
            Self {
                _dir: dir,
                corpus,
                store,
                progress_root,
            }
        }

        fn write_stream(&self, law: &str, version: &str, elements: &[DocElement]) {
            let law_dir = self.corpus.join(law);
            std::fs::create_dir_all(&law_dir).unwrap();
            std::fs::write(
                law_dir.join(format!("{version}.json")),
                serde_json::to_vec(elements).unwrap(),
            )
            .unwrap();
        }

        fn write_garbage(&self, law: &str, version: &str) {
            let law_dir = self.corpus.join(law);
            std::fs::create_dir_all(&law_dir).unwrap();
            std::fs::write(law_dir.join(format!("{version}.json")), b"not json").unwrap();
        }

        fn processor(&self, reviewer: Arc<dyn ReviewerPort>, workers: usize) -> BatchProcessor {
            BatchProcessor::new(
                self.store.clone(),
                Arc::new(JsonElementSource::new(&self.corpus)),
                reviewer,
                ProgressStore::new(&self.progress_root),
                BatchConfig {
                    worker_count: workers,
                    reviewer_name: "sim".to_string(),
                },
            )
        }
    }

    fn one_table(group: &str, texts: &[&str]) -> Vec<DocElement> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocElement::table_cell(*t, 1, i as u32, group, i as u32, 0))
            .collect()
    }

    /// Reviewer scripted per hash; anything unscripted is confirmed.
    struct ScriptedReviewer {
        decisions: HashMap<String, Decision>,
    }

    impl ReviewerPort for ScriptedReviewer {
        fn resolve(&self, request: &ReviewRequest) -> Result<Decision, ReviewError> {
            Ok(self
                .decisions
                .get(&request.hash)
                .cloned()
                .unwrap_or_else(Decision::confirmed))
        }
    }

    /// Reviewer that records every hash it was asked about.
    struct CountingReviewer {
        seen: Mutex<Vec<String>>,
    }

    impl CountingReviewer {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReviewerPort for CountingReviewer {
        fn resolve(&self, request: &ReviewRequest) -> Result<Decision, ReviewError> {
            self.seen.lock().unwrap().push(request.hash.clone());
            Ok(Decision::confirmed())
        }
    }

    #[test]
    fn batch_reviews_whole_corpus() {
        let fx = Fixture::new();
        for law in ["101", "152.1", "170.4"] {
            fx.write_stream(law, "1", &one_table("t1", &[law, "content"]));
        }
        let processor = fx.processor(Arc::new(SimulatedReviewer), 2);

        let outcome = processor
            .run(&WorkScope::All { latest_only: false }, false)
            .unwrap();

        assert_eq!(outcome.progress.completed_count(), 3);
        assert_eq!(outcome.progress.failed_count(), 0);
        assert_eq!(outcome.progress.status, super::super::BatchStatus::Completed);
        for law in ["101", "152.1", "170.4"] {
            let file = fx.store.load(law, "1").unwrap();
            assert_eq!(file.status, FileStatus::Completed);
            assert_eq!(file.reviewer.as_deref(), Some("sim"));
        }
    }

    #[test]
    fn one_failing_item_does_not_halt_the_pool() {
        let fx = Fixture::new();
        for i in [1, 2, 4, 5] {
            fx.write_stream(&format!("law{i}"), "1", &one_table("t1", &["x"]));
        }
        fx.write_garbage("law3", "1");
        let processor = fx.processor(Arc::new(SimulatedReviewer), 2);

        let outcome = processor
            .run(&WorkScope::All { latest_only: false }, false)
            .unwrap();

        assert_eq!(outcome.progress.completed_count(), 4);
        assert_eq!(outcome.progress.failed_count(), 1);
        assert!(outcome.progress.failed_items.contains_key("law3@1"));
        assert!(outcome.progress.failed_items["law3@1"].contains("malformed"));
        // The four successful items are individually reloadable and complete.
        for i in [1, 2, 4, 5] {
            let file = fx.store.load(&format!("law{i}"), "1").unwrap();
            assert!(validate_law_completion(&file));
        }
    }

    #[test]
    fn resume_skips_completed_items_exactly() {
        let fx = Fixture::new();
        for i in 0..5 {
            fx.write_stream(&format!("law{i}"), "1", &one_table("t1", &["cell"]));
        }
        let scope = WorkScope::All { latest_only: false };

        // Simulate an interrupted run: 2 of 5 items already checkpointed.
        let progress_store = ProgressStore::new(&fx.progress_root);
        let mut prior = BatchProgress::new(&scope.key(), 5);
        prior.record_completed("law0@1");
        prior.record_completed("law3@1");
        progress_store.save(&prior).unwrap();

        let reviewer = Arc::new(CountingReviewer::new());
        let processor = fx.processor(reviewer.clone(), 2);
        let outcome = processor.run(&scope, true).unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.progress.completed_count(), 5);
        // Each remaining item reviewed exactly once: one table per item.
        assert_eq!(reviewer.seen.lock().unwrap().len(), 3);
        assert_eq!(outcome.progress.batch_id, prior.batch_id);
    }

    #[test]
    fn fresh_run_overwrites_prior_progress() {
        let fx = Fixture::new();
        fx.write_stream("law0", "1", &one_table("t1", &["cell"]));
        let scope = WorkScope::All { latest_only: false };

        let progress_store = ProgressStore::new(&fx.progress_root);
        let mut prior = BatchProgress::new(&scope.key(), 1);
        prior.record_completed("law0@1");
        progress_store.save(&prior).unwrap();

        let reviewer = Arc::new(CountingReviewer::new());
        let processor = fx.processor(reviewer.clone(), 1);
        let outcome = processor.run(&scope, false).unwrap();

        // Not resumed: the item is processed again under a new batch id.
        assert_eq!(outcome.skipped, 0);
        assert_ne!(outcome.progress.batch_id, prior.batch_id);
        assert_eq!(reviewer.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn review_scenario_confirm_edit_reject_then_new_hash() {
        let fx = Fixture::new();
        // Three tables in law 170.4 version 118.
        let mut elements = one_table("t1", &["erste Tabelle"]);
        elements.extend(one_table("t2", &["zweite", "Tabelle"]));
        elements.extend(one_table("t3", &["dritte"]));
        fx.write_stream("170.4", "118", &elements);

        let drafts = extract_tables(&elements).unwrap();
        let (h1, h2, h3) = (
            drafts[0].hash.clone(),
            drafts[1].hash.clone(),
            drafts[2].hash.clone(),
        );

        let mut decisions = HashMap::new();
        decisions.insert(h1.clone(), Decision::confirmed());
        decisions.insert(
            h2.clone(),
            Decision::confirmed_with_changes(vec![
                vec!["zweite".to_string()],
                vec!["Tabelle (korrigiert)".to_string()],
            ]),
        );
        decisions.insert(h3.clone(), Decision::rejected("not a real table"));

        let scope = WorkScope::Law {
            law_id: "170.4".to_string(),
            version: Some("118".to_string()),
        };
        let processor = fx.processor(Arc::new(ScriptedReviewer { decisions }), 1);
        processor.run(&scope, false).unwrap();

        let file = fx.store.load("170.4", "118").unwrap();
        assert!(validate_law_completion(&file));
        assert_eq!(file.tables[&h1].status, TableStatus::ConfirmedWithoutChanges);
        assert_eq!(file.tables[&h2].status, TableStatus::ConfirmedWithChanges);
        assert_eq!(file.tables[&h3].status, TableStatus::Rejected);
        assert_eq!(file.tables[&h3].reason.as_deref(), Some("not a real table"));

        // A later extraction discovers a fourth table.
        let mut extended = elements.clone();
        extended.extend(one_table("t4", &["vierte"]));
        fx.write_stream("170.4", "118", &extended);
        let h4 = extract_tables(&extended).unwrap()[3].hash.clone();

        // Deferring reviewer: merge happens, nothing gets decided.
        let processor = fx.processor(
            Arc::new(ScriptedReviewer {
                decisions: HashMap::from([(h4.clone(), Decision::deferred())]),
            }),
            1,
        );
        processor.run(&scope, false).unwrap();

        let file = fx.store.load("170.4", "118").unwrap();
        assert_eq!(file.tables.len(), 4);
        assert_eq!(file.tables[&h1].status, TableStatus::ConfirmedWithoutChanges);
        assert_eq!(file.tables[&h2].status, TableStatus::ConfirmedWithChanges);
        assert_eq!(file.tables[&h3].status, TableStatus::Rejected);
        assert_eq!(file.tables[&h4].status, TableStatus::Undefined);
        assert!(!validate_law_completion(&file));
    }

    #[test]
    fn reviewer_error_fails_only_that_item() {
        struct FailingReviewer;
        impl ReviewerPort for FailingReviewer {
            fn resolve(&self, request: &ReviewRequest) -> Result<Decision, ReviewError> {
                if request.law_id == "bad" {
                    Err(ReviewError::Frontend("ui crashed".to_string()))
                } else {
                    Ok(Decision::confirmed())
                }
            }
        }

        let fx = Fixture::new();
        fx.write_stream("good", "1", &one_table("t1", &["x"]));
        fx.write_stream("bad", "1", &one_table("t1", &["y"]));
        let processor = fx.processor(Arc::new(FailingReviewer), 2);

        let outcome = processor
            .run(&WorkScope::All { latest_only: false }, false)
            .unwrap();

        assert_eq!(outcome.progress.completed_count(), 1);
        assert!(outcome.progress.failed_items.contains_key("bad@1"));
        // The failed item's file still exists with its undefined record —
        // nothing was partially applied.
        let file = fx.store.load("bad", "1").unwrap();
        assert_eq!(file.tables.len(), 1);
        assert!(!validate_law_completion(&file));
    }

    #[test]
    fn item_with_no_undefined_records_needs_no_reviewer() {
        let fx = Fixture::new();
        fx.write_stream("law0", "1", &one_table("t1", &["x"]));
        let scope = WorkScope::All { latest_only: false };

        // First run resolves everything.
        fx.processor(Arc::new(SimulatedReviewer), 1)
            .run(&scope, false)
            .unwrap();
        let stamped = fx.store.load("law0", "1").unwrap();

        // Second run: reviewer must not be consulted, file not restamped.
        let reviewer = Arc::new(CountingReviewer::new());
        fx.processor(reviewer.clone(), 1)
            .run(&scope, false)
            .unwrap();

        assert!(reviewer.seen.lock().unwrap().is_empty());
        assert_eq!(fx.store.load("law0", "1").unwrap(), stamped);
    }
}
