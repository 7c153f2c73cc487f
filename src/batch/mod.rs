//! Concurrent, resumable batch review.
//!
//! A bounded pool of workers drives extract → review → save across many
//! (law, version) work items; a coordinator is the single writer of the
//! durable progress record, so a killed batch resumes at the last consistent
//! state, at most redoing the items that were in flight.

pub mod processor;
pub mod progress;
pub mod scope;

use thiserror::Error;

pub use processor::{BatchConfig, BatchOutcome, BatchProcessor};
pub use progress::{BatchProgress, BatchStatus, ProgressStore};
pub use scope::{WorkItem, WorkScope};

use crate::extract::ExtractError;
use crate::review::ReviewError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("progress file {path} is corrupt: {detail}")]
    CorruptProgress { path: String, detail: String },

    #[error("progress persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("encoding progress record: {0}")]
    Encode(#[from] serde_json::Error),
}
