//! Reindex orchestrator
//!
//! Copies every document from a source (usually the type's specific alias)
//! into a destination index with `N` workers over disjoint id partitions,
//! then checks that the document counts agree within tolerance.

mod orchestrator;
mod partition;
mod progress;

pub use orchestrator::{count_deviation, ReindexJob, ReindexOutcome, Reindexer};
pub use partition::{java_string_hash, Partition};
pub use progress::Progress;

use crate::backend::BackendError;
use thiserror::Error;

/// Errors that abort a reindex
#[derive(Error, Debug)]
pub enum ReindexError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Reindex worker {worker} failed: {source}")]
    WorkerFailed {
        worker: u32,
        #[source]
        source: BackendError,
    },

    #[error("Reindex worker panicked: {0}")]
    WorkerPanicked(String),

    #[error(
        "Document count deviation {deviation:.4} exceeds tolerance {tolerance:.4} \
         (source {source_count}, destination {destination_count})"
    )]
    DeviationExceeded {
        source_count: u64,
        destination_count: u64,
        deviation: f64,
        tolerance: f64,
    },

    #[error("Invalid partition: worker {worker} of {workers}")]
    InvalidPartition { worker: u32, workers: u32 },
}
