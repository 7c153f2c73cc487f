//! The reviewer capability — how a decision is obtained for a draft table.
//!
//! The batch engine and the store depend only on `ReviewerPort`, never on a
//! concrete adapter. Two implementations:
//! - `SimulatedReviewer` for headless runs and tests, fully deterministic
//! - `ChannelReviewer`, which surfaces drafts to an external UI over a paired
//!   channel and blocks until the decision arrives

use std::sync::mpsc;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::records::TableStatus;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("review session closed before a decision arrived")]
    SessionClosed,

    #[error("reviewer frontend failed: {0}")]
    Frontend(String),
}

/// A draft table surfaced for review. Owned and serializable so interactive
/// adapters can ship it across a process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub law_id: String,
    pub version: String,
    pub hash: String,
    pub structure: Vec<Vec<String>>,
    pub pages: Vec<u32>,
    pub has_header: bool,
}

/// A reviewer's disposition for one table. `status` may stay `Undefined` to
/// defer the table to a later run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: TableStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_structure: Option<Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    pub fn confirmed() -> Self {
        Self {
            status: TableStatus::ConfirmedWithoutChanges,
            corrected_structure: None,
            merged_into: None,
            reason: None,
        }
    }

    pub fn confirmed_with_changes(corrected: Vec<Vec<String>>) -> Self {
        Self {
            status: TableStatus::ConfirmedWithChanges,
            corrected_structure: Some(corrected),
            merged_into: None,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Rejected,
            corrected_structure: None,
            merged_into: None,
            reason: Some(reason.into()),
        }
    }

    pub fn merged(target: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Merged,
            corrected_structure: None,
            merged_into: Some(target.into()),
            reason: None,
        }
    }

    pub fn deferred() -> Self {
        Self {
            status: TableStatus::Undefined,
            corrected_structure: None,
            merged_into: None,
            reason: None,
        }
    }
}

/// Capability interface through which a decision is obtained for one draft.
pub trait ReviewerPort: Send + Sync {
    fn resolve(&self, request: &ReviewRequest) -> Result<Decision, ReviewError>;
}

// ═══════════════════════════════════════════
// Simulated reviewer
// ═══════════════════════════════════════════

/// Deterministic stand-in for a human: a table with at least one non-empty
/// cell is confirmed unchanged, a wholly empty table is rejected.
pub struct SimulatedReviewer;

impl SimulatedReviewer {
    pub const EMPTY_TABLE_REASON: &'static str = "table has no content";
}

impl ReviewerPort for SimulatedReviewer {
    fn resolve(&self, request: &ReviewRequest) -> Result<Decision, ReviewError> {
        let has_content = request
            .structure
            .iter()
            .flatten()
            .any(|cell| !cell.is_empty());
        if has_content {
            Ok(Decision::confirmed())
        } else {
            Ok(Decision::rejected(Self::EMPTY_TABLE_REASON))
        }
    }
}

// ═══════════════════════════════════════════
// Interactive (channel) reviewer
// ═══════════════════════════════════════════

/// One draft awaiting an external decision. The UI side answers by sending
/// exactly one `Decision` through `reply`.
pub struct ReviewPrompt {
    pub request: ReviewRequest,
    pub reply: mpsc::Sender<Decision>,
}

/// The UI side of an interactive review session.
pub struct ReviewSession {
    prompts: mpsc::Receiver<ReviewPrompt>,
}

impl ReviewSession {
    /// Next draft awaiting a decision, or `None` once the reviewing side has
    /// shut down.
    pub fn next_prompt(&self) -> Option<ReviewPrompt> {
        self.prompts.recv().ok()
    }
}

/// Interactive adapter: forwards each draft to the attached session and
/// blocks until its decision arrives. Dropping the `ReviewSession` fails all
/// further resolutions with `SessionClosed` — the manual fallback is to rerun
/// review with a fresh session, which picks up at the still-`undefined`
/// records.
pub struct ChannelReviewer {
    prompts: Mutex<mpsc::Sender<ReviewPrompt>>,
}

impl ChannelReviewer {
    /// Build a connected reviewer/session pair.
    pub fn session() -> (Self, ReviewSession) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                prompts: Mutex::new(tx),
            },
            ReviewSession { prompts: rx },
        )
    }
}

impl ReviewerPort for ChannelReviewer {
    fn resolve(&self, request: &ReviewRequest) -> Result<Decision, ReviewError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let prompt = ReviewPrompt {
            request: request.clone(),
            reply: reply_tx,
        };
        self.prompts
            .lock()
            .map_err(|_| ReviewError::Frontend("prompt channel poisoned".to_string()))?
            .send(prompt)
            .map_err(|_| ReviewError::SessionClosed)?;
        reply_rx.recv().map_err(|_| ReviewError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(structure: Vec<Vec<String>>) -> ReviewRequest {
        ReviewRequest {
            law_id: "170.4".to_string(),
            version: "118".to_string(),
            hash: "h1".to_string(),
            structure,
            pages: vec![1],
            has_header: false,
        }
    }

    #[test]
    fn simulated_confirms_tables_with_content() {
        let request = make_request(vec![vec!["".to_string(), "Gebühr".to_string()]]);
        let decision = SimulatedReviewer.resolve(&request).unwrap();
        assert_eq!(decision.status, TableStatus::ConfirmedWithoutChanges);
        assert!(decision.reason.is_none());
    }

    #[test]
    fn simulated_rejects_empty_tables() {
        let request = make_request(vec![vec!["".to_string()], vec!["".to_string()]]);
        let decision = SimulatedReviewer.resolve(&request).unwrap();
        assert_eq!(decision.status, TableStatus::Rejected);
        assert_eq!(
            decision.reason.as_deref(),
            Some(SimulatedReviewer::EMPTY_TABLE_REASON)
        );
    }

    #[test]
    fn simulated_is_deterministic() {
        let request = make_request(vec![vec!["x".to_string()]]);
        let a = SimulatedReviewer.resolve(&request).unwrap();
        let b = SimulatedReviewer.resolve(&request).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn channel_reviewer_round_trip() {
        let (reviewer, session) = ChannelReviewer::session();
        let handle = std::thread::spawn(move || {
            let prompt = session.next_prompt().expect("prompt should arrive");
            assert_eq!(prompt.request.hash, "h1");
            prompt
                .reply
                .send(Decision::rejected("not a real table"))
                .unwrap();
        });

        let request = make_request(vec![vec!["x".to_string()]]);
        let decision = reviewer.resolve(&request).unwrap();

        assert_eq!(decision.status, TableStatus::Rejected);
        assert_eq!(decision.reason.as_deref(), Some("not a real table"));
        handle.join().unwrap();
    }

    #[test]
    fn dropped_session_closes_reviewer() {
        let (reviewer, session) = ChannelReviewer::session();
        drop(session);
        let request = make_request(vec![vec!["x".to_string()]]);
        let err = reviewer.resolve(&request).unwrap_err();
        assert!(matches!(err, ReviewError::SessionClosed));
    }

    #[test]
    fn dropped_prompt_reply_closes_reviewer() {
        let (reviewer, session) = ChannelReviewer::session();
        let handle = std::thread::spawn(move || {
            // Take the prompt but never answer.
            let prompt = session.next_prompt().expect("prompt should arrive");
            drop(prompt);
        });

        let request = make_request(vec![vec!["x".to_string()]]);
        let err = reviewer.resolve(&request).unwrap_err();
        assert!(matches!(err, ReviewError::SessionClosed));
        handle.join().unwrap();
    }

    #[test]
    fn decision_serde_skips_absent_fields() {
        let json = serde_json::to_string(&Decision::confirmed()).unwrap();
        assert!(!json.contains("corrected_structure"));
        assert!(!json.contains("merged_into"));
        assert!(!json.contains("reason"));
    }
}
