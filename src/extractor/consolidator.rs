use crate::error::Result;
use crate::extractor::output_manager::Buckets;
use crate::extractor::safe_mover::FileMover;
use crate::extractor::tally::MoveTally;
use crate::extractor::{ProgressCallback, ProgressEvent};
use crate::scanner::tree_scanner::relative_folder;
use crate::scanner::{Classification, ClassificationRules, TreeScanner};
use std::path::Path;
use tracing::{debug, warn};

/// Moves every classifiable file of one extracted tree into the shared buckets.
pub struct TreeConsolidator<'a> {
    rules: &'a ClassificationRules,
    mover: &'a dyn FileMover,
    folder_prefix: &'a Path,
}

impl<'a> TreeConsolidator<'a> {
    pub fn new(rules: &'a ClassificationRules, mover: &'a dyn FileMover) -> Self {
        Self {
            rules,
            mover,
            folder_prefix: Path::new(""),
        }
    }

    /// Folders that contain the tree being consolidated, relative to the
    /// root extracted tree. They take part in folder rules.
    pub fn with_folder_prefix(mut self, prefix: &'a Path) -> Self {
        self.folder_prefix = prefix;
        self
    }

    /// Two passes over `root`: a census for the progress total, then the
    /// moving walk. Files under ignored folders count as skipped without
    /// being visited. Raw containers are left for the caller to recurse into
    /// and appear in neither the moved nor the skipped count.
    pub fn consolidate(
        &self,
        root: &Path,
        buckets: &Buckets,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<MoveTally> {
        let scanner = TreeScanner::new(self.rules).with_excluded_dirs(buckets.dirs());

        let census = scanner.census(root)?;
        let total = census.total_files;

        let emit = |current: usize, message: String| {
            if let Some(callback) = progress {
                callback(&ProgressEvent::new(current, total, message));
            }
        };

        emit(0, "Organizing extracted files...".to_string());

        let mut tally = MoveTally::new();
        tally.add_skipped(census.ignored_files);
        let mut processed = census.ignored_files;

        scanner.walk_files(root, |entry| {
            processed += 1;

            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();

            if !self.rules.is_container(path) {
                let folder = self.folder_prefix.join(relative_folder(root, path));
                let classification = self.rules.classify(Path::new(entry.file_name()), &folder);
                self.place(path, classification, buckets, &mut tally);
            }

            emit(processed, format!("Processing: {}", file_name));
        })?;

        emit(total, format!("Organized {} files", tally.moved()));

        Ok(tally)
    }

    fn place(
        &self,
        path: &Path,
        classification: Classification,
        buckets: &Buckets,
        tally: &mut MoveTally,
    ) {
        let Some(destination_dir) = buckets.dir_for(classification) else {
            tally.record(Classification::Skip);
            return;
        };

        match self.mover.move_file(path, destination_dir) {
            Ok(destination) => {
                debug!("{} -> {}", path.display(), destination.display());
                tally.record(classification);
            }
            Err(e) => {
                warn!("Failed to move {}: {}", path.display(), e);
                tally.add_skipped(1);
            }
        }
    }
}
