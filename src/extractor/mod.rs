pub mod consolidator;
pub mod output_manager;
pub mod pipeline;
pub mod safe_mover;
pub mod tally;

pub use consolidator::TreeConsolidator;
pub use output_manager::{Buckets, OrganizeReport, OutputManager};
pub use pipeline::{ExtractedTree, ExtractionRequest, RecursiveExtractor};
pub use safe_mover::{FileMover, SafeMover};
pub use tally::{ContainerFailure, ExtractionOutcome, MoveTally};

/// One status update from the pipeline worker. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn new<S: Into<String>>(current: usize, total: usize, message: S) -> Self {
        Self {
            current,
            total,
            message: message.into(),
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current.min(self.total) as f64 / self.total as f64) * 100.0
        }
    }
}

pub type ProgressCallback<'a> = dyn Fn(&ProgressEvent) + Send + Sync + 'a;
