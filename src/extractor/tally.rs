use crate::error::{RpfSortError, UserFriendlyError};
use crate::extractor::pipeline::ExtractedTree;
use crate::scanner::Classification;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::path::PathBuf;

/// Per-pass file counts, summed field-wise up the container tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTally {
    pub stream: usize,
    pub data: usize,
    pub skipped: usize,
}

impl MoveTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Stream => self.stream += 1,
            Classification::Data => self.data += 1,
            Classification::Skip => self.skipped += 1,
        }
    }

    pub fn add_skipped(&mut self, count: usize) {
        self.skipped += count;
    }

    /// Files that landed in either bucket.
    pub fn moved(&self) -> usize {
        self.stream + self.data
    }

    pub fn total(&self) -> usize {
        self.moved() + self.skipped
    }

    pub fn merge(self, other: MoveTally) -> MoveTally {
        MoveTally {
            stream: self.stream + other.stream,
            data: self.data + other.data,
            skipped: self.skipped + other.skipped,
        }
    }
}

impl Add for MoveTally {
    type Output = MoveTally;

    fn add(self, other: MoveTally) -> MoveTally {
        self.merge(other)
    }
}

impl AddAssign for MoveTally {
    fn add_assign(&mut self, other: MoveTally) {
        *self = self.merge(other);
    }
}

/// A nested container whose branch was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFailure {
    pub container: PathBuf,
    pub message: String,
}

/// Result of extracting one container together with everything nested in it.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub tally: MoveTally,
    pub error: Option<RpfSortError>,
    /// Nested containers whose content now lives in the buckets, in discovery order.
    pub absorbed_containers: Vec<PathBuf>,
    pub failed_containers: Vec<ContainerFailure>,
    pub extracted_tree: Option<ExtractedTree>,
}

impl ExtractionOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed(error: RpfSortError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Fold the outcome of the nested `container` into this one.
    ///
    /// A failed branch contributes nothing but a failure record; a branch that
    /// moved at least one file marks `container` (and whatever it absorbed)
    /// as absorbed.
    pub fn absorb_nested(&mut self, container: PathBuf, nested: ExtractionOutcome) {
        if let Some(ref error) = nested.error {
            self.failed_containers.push(ContainerFailure {
                container,
                message: error.user_message(),
            });
            self.failed_containers.extend(nested.failed_containers);
            return;
        }

        self.tally += nested.tally;

        if nested.tally.moved() > 0 {
            self.absorbed_containers.push(container);
            self.absorbed_containers.extend(nested.absorbed_containers);
        }

        self.failed_containers.extend(nested.failed_containers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(stream: usize, data: usize, skipped: usize) -> MoveTally {
        MoveTally {
            stream,
            data,
            skipped,
        }
    }

    #[test]
    fn test_record() {
        let mut t = MoveTally::new();
        t.record(Classification::Stream);
        t.record(Classification::Stream);
        t.record(Classification::Data);
        t.record(Classification::Skip);
        t.add_skipped(3);

        assert_eq!(t, tally(2, 1, 4));
        assert_eq!(t.moved(), 3);
        assert_eq!(t.total(), 7);
    }

    #[test]
    fn test_merge_is_associative_and_commutative() {
        let a = tally(1, 2, 3);
        let b = tally(10, 0, 5);
        let c = tally(0, 7, 1);

        let expected = tally(11, 9, 9);
        assert_eq!((a + b) + c, expected);
        assert_eq!(a + (b + c), expected);
        assert_eq!(c + a + b, expected);
        assert_eq!(b.merge(c).merge(a), expected);

        let mut running = MoveTally::new();
        running += c;
        running += b;
        running += a;
        assert_eq!(running, expected);
    }

    #[test]
    fn test_absorb_successful_nested() {
        let mut parent = ExtractionOutcome::new();
        parent.tally = tally(1, 1, 0);

        let mut child = ExtractionOutcome::new();
        child.tally = tally(2, 0, 1);
        child.absorbed_containers = vec![PathBuf::from("c/inner.rpf")];

        parent.absorb_nested(PathBuf::from("c.rpf"), child);

        assert_eq!(parent.tally, tally(3, 1, 1));
        assert_eq!(
            parent.absorbed_containers,
            vec![PathBuf::from("c.rpf"), PathBuf::from("c/inner.rpf")]
        );
        assert!(parent.failed_containers.is_empty());
    }

    #[test]
    fn test_nested_without_moves_is_not_absorbed() {
        let mut parent = ExtractionOutcome::new();

        let mut child = ExtractionOutcome::new();
        child.tally = tally(0, 0, 4);
        parent.absorb_nested(PathBuf::from("empty.rpf"), child);

        assert_eq!(parent.tally.skipped, 4);
        assert!(parent.absorbed_containers.is_empty());
    }

    #[test]
    fn test_failed_nested_keeps_parent_tally() {
        let mut parent = ExtractionOutcome::new();
        parent.tally = tally(5, 2, 0);

        let child = ExtractionOutcome::failed(RpfSortError::NoContentExtracted {
            container: PathBuf::from("bad.rpf"),
        });
        parent.absorb_nested(PathBuf::from("bad.rpf"), child);

        assert_eq!(parent.tally, tally(5, 2, 0));
        assert!(parent.is_success());
        assert_eq!(parent.failed_containers.len(), 1);
        assert_eq!(parent.failed_containers[0].container, PathBuf::from("bad.rpf"));
    }
}
