use crate::config::Config;
use crate::decoder::ContainerDecoder;
use crate::error::{Result, RpfSortError};
use crate::extractor::consolidator::TreeConsolidator;
use crate::extractor::output_manager::{scratch_dir_name, Buckets};
use crate::extractor::safe_mover::{FileMover, SafeMover};
use crate::extractor::tally::ExtractionOutcome;
use crate::extractor::{ProgressCallback, ProgressEvent};
use crate::scanner::tree_scanner::relative_folder;
use crate::scanner::{ClassificationRules, TreeScanner};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Directory the decoder produced for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTree {
    pub path: PathBuf,
    /// False when the directory was already there before the decoder ran.
    pub created_by_run: bool,
}

/// One container to extract. Nested requests share the root's output root.
#[derive(Clone)]
pub struct ExtractionRequest {
    pub container: PathBuf,
    pub decoder: Arc<dyn ContainerDecoder>,
    pub output_root: PathBuf,
    pub nested: bool,
    pub depth: usize,
    /// Folders holding the container, relative to the root extracted tree.
    pub folder_prefix: PathBuf,
}

impl ExtractionRequest {
    pub fn root(container: PathBuf, decoder: Arc<dyn ContainerDecoder>, output_root: PathBuf) -> Self {
        Self {
            container,
            decoder,
            output_root,
            nested: false,
            depth: 0,
            folder_prefix: PathBuf::new(),
        }
    }

    /// `tree_root` is the extracted tree `container` was found in.
    fn nested_child(&self, container: PathBuf, tree_root: &Path) -> Self {
        let folder_prefix = self.folder_prefix.join(relative_folder(tree_root, &container));
        Self {
            container,
            decoder: Arc::clone(&self.decoder),
            output_root: self.output_root.clone(),
            nested: true,
            depth: self.depth + 1,
            folder_prefix,
        }
    }

    fn file_name(&self) -> String {
        self.container
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.container.display().to_string())
    }
}

/// A container whose tree has been consolidated and whose nested containers
/// are being worked off one by one.
struct Frame {
    request: ExtractionRequest,
    outcome: ExtractionOutcome,
    tree: ExtractedTree,
    pending: Vec<PathBuf>,
    next: usize,
}

impl Frame {
    fn next_pending(&mut self) -> Option<PathBuf> {
        let container = self.pending.get(self.next).cloned()?;
        self.next += 1;
        Some(container)
    }
}

/// Extracts a container, consolidates its tree and works through every
/// nested container with an explicit stack, depth first.
pub struct RecursiveExtractor {
    rules: ClassificationRules,
    mover: Box<dyn FileMover>,
    output_folder: String,
    max_depth: usize,
    progress: Option<Box<ProgressCallback<'static>>>,
}

impl RecursiveExtractor {
    pub fn new(rules: ClassificationRules) -> Self {
        Self {
            rules,
            mover: Box::new(SafeMover::new()),
            output_folder: "dlc".to_string(),
            max_depth: 16,
            progress: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let rules = ClassificationRules::new(&config.rules)?;
        let mover = SafeMover::new().with_chunk_size(config.output.copy_chunk_size);

        Ok(Self::new(rules)
            .with_mover(mover)
            .with_output_folder(config.decoder.output_folder.clone())
            .with_max_depth(config.rules.max_depth))
    }

    pub fn with_mover<M: FileMover + 'static>(mut self, mover: M) -> Self {
        self.mover = Box::new(mover);
        self
    }

    pub fn with_output_folder<S: Into<String>>(mut self, folder: S) -> Self {
        self.output_folder = folder.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Run the whole container tree rooted at `request`.
    ///
    /// Decoder failures of the root end the run with `error` set. A failing
    /// nested container only loses its own branch; it is recorded in
    /// `failed_containers` and its siblings still run.
    pub fn extract(&self, request: ExtractionRequest) -> ExtractionOutcome {
        let buckets = Buckets::for_root(&request.output_root);
        let mut stack: Vec<Frame> = Vec::new();

        match self.open_frame(request, &buckets) {
            Ok(frame) => stack.push(frame),
            Err(outcome) => return outcome,
        }

        while let Some(frame) = stack.last_mut() {
            if let Some(container) = frame.next_pending() {
                let index = frame.next;
                let count = frame.pending.len();
                let child = frame.request.nested_child(container.clone(), &frame.tree.path);

                self.emit(
                    index,
                    count,
                    format!(
                        "Processing nested container {}/{}: {}",
                        index,
                        count,
                        child.file_name()
                    ),
                );

                match self.open_frame(child, &buckets) {
                    Ok(child_frame) => stack.push(child_frame),
                    Err(failed) => {
                        if let Some(parent) = stack.last_mut() {
                            self.record_nested(parent, container, failed);
                        }
                    }
                }
                continue;
            }

            let Some(done) = stack.pop() else {
                break;
            };
            let container = done.request.container.clone();
            let outcome = self.close_frame(done);

            match stack.last_mut() {
                Some(parent) => self.record_nested(parent, container, outcome),
                None => return outcome,
            }
        }

        ExtractionOutcome::new()
    }

    /// Decode one container, locate its tree, prepare the buckets (root
    /// only), consolidate and list the nested containers found.
    fn open_frame(
        &self,
        request: ExtractionRequest,
        buckets: &Buckets,
    ) -> std::result::Result<Frame, ExtractionOutcome> {
        if request.depth > self.max_depth {
            return Err(ExtractionOutcome::failed(RpfSortError::NestingTooDeep {
                container: request.container.clone(),
                max_depth: self.max_depth,
            }));
        }

        let parent_dir = container_dir(&request.container);
        let before = snapshot_dirs(&parent_dir);

        self.emit(0, 0, format!("Extracting: {}", request.file_name()));

        let decoded = request.decoder.decode(&request.container);
        if let Err(e) = decoded.into_result(&request.container) {
            self.discard_scratch(&request, &before);
            return Err(ExtractionOutcome::failed(e));
        }

        let Some(tree) = self.locate_output(&request, &parent_dir, &before, buckets) else {
            self.discard_scratch(&request, &before);
            return Err(ExtractionOutcome::failed(RpfSortError::NoContentExtracted {
                container: request.container.clone(),
            }));
        };
        debug!("Extracted tree for {}: {}", request.file_name(), tree.path.display());

        match self.consolidate_tree(&request, &tree, buckets) {
            Ok((outcome, pending)) => Ok(Frame {
                request,
                outcome,
                tree,
                pending,
                next: 0,
            }),
            Err(e) => {
                let mut failed = ExtractionOutcome::failed(e);
                if request.nested {
                    self.remove_scratch_tree(&tree);
                } else {
                    failed.extracted_tree = Some(tree);
                }
                Err(failed)
            }
        }
    }

    fn consolidate_tree(
        &self,
        request: &ExtractionRequest,
        tree: &ExtractedTree,
        buckets: &Buckets,
    ) -> Result<(ExtractionOutcome, Vec<PathBuf>)> {
        if !request.nested {
            buckets.recreate()?;
        }

        let consolidator = TreeConsolidator::new(&self.rules, self.mover.as_ref())
            .with_folder_prefix(&request.folder_prefix);
        let tally = consolidator.consolidate(&tree.path, buckets, self.progress.as_deref())?;

        let pending = TreeScanner::new(&self.rules)
            .with_excluded_dirs(buckets.dirs())
            .find_containers(&tree.path)
            .unwrap_or_else(|e| {
                warn!("Nested container scan of {} failed: {}", tree.path.display(), e);
                Vec::new()
            });

        if !pending.is_empty() {
            self.emit(
                0,
                pending.len(),
                format!("Found {} nested containers...", pending.len()),
            );
        }

        let mut outcome = ExtractionOutcome::new();
        outcome.tally = tally;
        Ok((outcome, pending))
    }

    /// Nested scratch trees are removed here; the root's tree is handed back
    /// to the caller.
    fn close_frame(&self, frame: Frame) -> ExtractionOutcome {
        let mut outcome = frame.outcome;

        if frame.request.nested {
            self.remove_scratch_tree(&frame.tree);
        } else {
            outcome.extracted_tree = Some(frame.tree);
        }

        outcome
    }

    fn record_nested(&self, parent: &mut Frame, container: PathBuf, nested: ExtractionOutcome) {
        if let Some(ref error) = nested.error {
            if error.is_decoder_failure() {
                warn!("Nested container {} failed: {}", container.display(), error);
            } else {
                error!("Nested container {} failed: {}", container.display(), error);
            }
        } else {
            info!(
                "Nested container {} done: {} stream, {} data, {} skipped",
                container.display(),
                nested.tally.stream,
                nested.tally.data,
                nested.tally.skipped
            );
        }

        parent.outcome.absorb_nested(container, nested);
    }

    /// Candidates in order: the scratch folder (nested only), the configured
    /// output folder, a folder named after the container. Failing those, the
    /// first folder next to the container that the decoder run created.
    ///
    /// A nested request never takes a folder that existed before its decoder
    /// ran, since the parent tree has already been consolidated.
    fn locate_output(
        &self,
        request: &ExtractionRequest,
        parent_dir: &Path,
        before: &HashSet<PathBuf>,
        buckets: &Buckets,
    ) -> Option<ExtractedTree> {
        let mut candidates = Vec::new();
        if request.nested {
            candidates.push(parent_dir.join(scratch_dir_name(&request.file_name())));
        }
        candidates.push(parent_dir.join(&self.output_folder));
        if let Some(stem) = request.container.file_stem() {
            candidates.push(parent_dir.join(stem));
        }

        let eligible = |path: &Path| path.is_dir() && !buckets.is_bucket(path);

        for path in candidates.into_iter().filter(|c| eligible(c)) {
            let created_by_run = !before.contains(&path);
            if !created_by_run {
                if request.nested {
                    debug!("Not using preexisting folder {}", path.display());
                    continue;
                }
                warn!("Output folder {} existed before extraction", path.display());
            }

            return Some(ExtractedTree {
                path,
                created_by_run,
            });
        }

        let mut fresh: Vec<PathBuf> = snapshot_dirs(parent_dir)
            .into_iter()
            .filter(|dir| !before.contains(dir))
            .filter(|dir| {
                dir.file_name()
                    .map(|n| !Buckets::is_bucket_name(&n.to_string_lossy()))
                    .unwrap_or(false)
            })
            .filter(|dir| eligible(dir))
            .collect();
        fresh.sort();

        fresh.into_iter().next().map(|path| {
            debug!("Using fallback output folder {}", path.display());
            ExtractedTree {
                path,
                created_by_run: true,
            }
        })
    }

    fn discard_scratch(&self, request: &ExtractionRequest, before: &HashSet<PathBuf>) {
        if !request.nested {
            return;
        }

        let scratch = container_dir(&request.container).join(scratch_dir_name(&request.file_name()));
        if !before.contains(&scratch) {
            self.remove_scratch_tree(&ExtractedTree {
                path: scratch,
                created_by_run: true,
            });
        }
    }

    fn remove_scratch_tree(&self, tree: &ExtractedTree) {
        if !tree.created_by_run || !tree.path.is_dir() {
            return;
        }

        if let Err(e) = fs::remove_dir_all(&tree.path) {
            warn!("Cleanup warning for {}: {}", tree.path.display(), e);
        }
    }

    fn emit(&self, current: usize, total: usize, message: String) {
        if let Some(ref callback) = self.progress {
            callback(&ProgressEvent::new(current, total, message));
        }
    }
}

fn container_dir(container: &Path) -> PathBuf {
    match container.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn snapshot_dirs(dir: &Path) -> HashSet<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect(),
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            HashSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodeStatus;
    use crate::extractor::tally::MoveTally;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a fixed file list for each container file name, into the
    /// folder a real decoder would use.
    struct FakeDecoder {
        trees: HashMap<String, Vec<&'static str>>,
        output: fn(&Path) -> PathBuf,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDecoder {
        fn new(trees: &[(&str, Vec<&'static str>)]) -> Self {
            Self {
                trees: trees
                    .iter()
                    .map(|(name, files)| (name.to_string(), files.clone()))
                    .collect(),
                output: conventional_output,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    fn conventional_output(container: &Path) -> PathBuf {
        let parent = container.parent().unwrap();
        let name = container.file_name().unwrap().to_string_lossy().to_string();
        if name == "root.rpf" {
            parent.join("dlc")
        } else {
            parent.join(scratch_dir_name(&name))
        }
    }

    impl ContainerDecoder for FakeDecoder {
        fn decode(&self, container: &Path) -> DecodeStatus {
            let name = container.file_name().unwrap().to_string_lossy().to_string();
            self.calls.lock().unwrap().push(name.clone());

            let Some(files) = self.trees.get(&name) else {
                return DecodeStatus::Failed {
                    code: Some(1),
                    diagnostics: format!("cannot open {}", name),
                };
            };

            let out = (self.output)(container);
            fs::create_dir_all(&out).unwrap();
            for file in files {
                let path = out.join(file);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, file.as_bytes()).unwrap();
            }
            DecodeStatus::Completed
        }
    }

    fn root_container(dir: &Path) -> PathBuf {
        let container = dir.join("root.rpf");
        fs::write(&container, "rpf").unwrap();
        container
    }

    fn run(dir: &Path, decoder: FakeDecoder) -> (ExtractionOutcome, Arc<FakeDecoder>) {
        let decoder = Arc::new(decoder);
        let request = ExtractionRequest::root(
            root_container(dir),
            decoder.clone(),
            dir.to_path_buf(),
        );
        let outcome = RecursiveExtractor::new(ClassificationRules::default()).extract(request);
        (outcome, decoder)
    }

    #[test]
    fn test_depth_first_merge_order() {
        let temp_dir = TempDir::new().unwrap();
        let decoder = FakeDecoder::new(&[
            ("root.rpf", vec!["a.ydr", "x/one.rpf", "y/two.rpf"]),
            ("one.rpf", vec!["b.ydr", "inner.rpf"]),
            ("inner.rpf", vec!["c.meta"]),
            ("two.rpf", vec!["d.yft"]),
        ]);

        let (outcome, decoder) = run(temp_dir.path(), decoder);

        assert!(outcome.is_success());
        assert_eq!(outcome.tally, MoveTally { stream: 3, data: 1, skipped: 0 });
        assert_eq!(
            *decoder.calls.lock().unwrap(),
            vec!["root.rpf", "one.rpf", "inner.rpf", "two.rpf"]
        );

        let absorbed: Vec<String> = outcome
            .absorbed_containers
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(absorbed, vec!["one.rpf", "inner.rpf", "two.rpf"]);
    }

    #[test]
    fn test_nested_failure_keeps_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let decoder = FakeDecoder::new(&[
            ("root.rpf", vec!["a.ydr", "bad.rpf", "good.rpf"]),
            ("good.rpf", vec!["g.ymap"]),
        ]);

        let (outcome, _) = run(temp_dir.path(), decoder);

        assert!(outcome.is_success());
        assert_eq!(outcome.tally.stream, 2);
        assert_eq!(outcome.failed_containers.len(), 1);
        assert!(outcome.failed_containers[0]
            .container
            .ends_with("bad.rpf"));
        assert!(temp_dir.path().join("stream/g.ymap").exists());
    }

    #[test]
    fn test_scratch_dirs_removed_after_nested_run() {
        let temp_dir = TempDir::new().unwrap();
        let decoder = FakeDecoder::new(&[
            ("root.rpf", vec!["sub/c.rpf"]),
            ("c.rpf", vec!["d.ydr"]),
        ]);

        let (outcome, _) = run(temp_dir.path(), decoder);

        let tree = outcome.extracted_tree.clone().unwrap();
        assert_eq!(tree.path, temp_dir.path().join("dlc"));
        assert!(tree.created_by_run);
        assert!(!temp_dir.path().join("dlc/sub/_temp_c.rpf_extract").exists());
        assert!(temp_dir.path().join("dlc/sub/c.rpf").exists());
    }

    #[test]
    fn test_depth_limit() {
        let temp_dir = TempDir::new().unwrap();
        let decoder = FakeDecoder::new(&[
            ("root.rpf", vec!["l1.rpf"]),
            ("l1.rpf", vec!["a.ydr", "l2.rpf"]),
            ("l2.rpf", vec!["b.ydr"]),
        ]);
        let decoder = Arc::new(decoder);
        let request = ExtractionRequest::root(
            root_container(temp_dir.path()),
            decoder.clone(),
            temp_dir.path().to_path_buf(),
        );

        let outcome = RecursiveExtractor::new(ClassificationRules::default())
            .with_max_depth(1)
            .extract(request);

        assert!(outcome.is_success());
        assert_eq!(outcome.tally.stream, 1);
        assert_eq!(outcome.failed_containers.len(), 1);
        assert!(outcome.failed_containers[0].message.contains("l2.rpf"));
        assert!(!decoder.calls.lock().unwrap().contains(&"l2.rpf".to_string()));
    }

    #[test]
    fn test_fallback_ignores_preexisting_dirs() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("leftover/old")).unwrap();
        fs::write(temp_dir.path().join("leftover/old/stale.ydr"), "x").unwrap();

        let mut decoder = FakeDecoder::new(&[("root.rpf", vec!["fresh.ydr"])]);
        decoder.output = |container| container.parent().unwrap().join("unpacked");

        let (outcome, _) = run(temp_dir.path(), decoder);

        assert!(outcome.is_success());
        assert_eq!(
            outcome.extracted_tree.unwrap().path,
            temp_dir.path().join("unpacked")
        );
        assert!(temp_dir.path().join("stream/fresh.ydr").exists());
        assert!(!temp_dir.path().join("stream/stale.ydr").exists());
    }

    #[test]
    fn test_no_fresh_output_is_no_content() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("leftover")).unwrap();

        let mut decoder = FakeDecoder::new(&[("root.rpf", vec![])]);
        decoder.output = |container| container.parent().unwrap().join("leftover");

        let (outcome, _) = run(temp_dir.path(), decoder);

        assert!(matches!(
            outcome.error,
            Some(RpfSortError::NoContentExtracted { .. })
        ));
        assert!(!temp_dir.path().join("stream").exists());
    }

    #[test]
    fn test_nested_tree_keeps_containing_folders() {
        let temp_dir = TempDir::new().unwrap();
        let decoder = FakeDecoder::new(&[
            ("root.rpf", vec!["vehicles/car.rpf"]),
            ("car.rpf", vec!["handling.meta", "sub/deeper.rpf"]),
            ("deeper.rpf", vec!["carvariations.meta"]),
        ]);

        let (outcome, _) = run(temp_dir.path(), decoder);

        assert!(outcome.is_success());
        assert_eq!(outcome.tally, MoveTally { stream: 2, data: 0, skipped: 0 });
        assert!(temp_dir.path().join("stream/handling.meta").exists());
        assert!(temp_dir.path().join("stream/carvariations.meta").exists());
        assert!(!temp_dir.path().join("data").read_dir().unwrap().any(|_| true));
    }

    #[test]
    fn test_nested_request_rejects_preexisting_folder() {
        let temp_dir = TempDir::new().unwrap();
        let mut decoder = FakeDecoder::new(&[
            ("root.rpf", vec!["models/a.ydr", "models.rpf"]),
            ("models.rpf", vec![]),
        ]);
        decoder.output = |container| {
            let parent = container.parent().unwrap();
            if container.ends_with("root.rpf") {
                parent.join("dlc")
            } else {
                parent.join("models")
            }
        };

        let (outcome, _) = run(temp_dir.path(), decoder);

        assert!(outcome.is_success());
        assert_eq!(outcome.tally, MoveTally { stream: 1, data: 0, skipped: 0 });
        assert!(outcome.absorbed_containers.is_empty());
        assert_eq!(outcome.failed_containers.len(), 1);
        assert!(outcome.failed_containers[0].container.ends_with("models.rpf"));
        assert!(outcome.failed_containers[0]
            .message
            .contains("No extracted content found"));
        assert!(!temp_dir.path().join("stream/a_1.ydr").exists());
    }

    #[test]
    fn test_root_may_reuse_preexisting_output_folder() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("dlc")).unwrap();
        fs::write(temp_dir.path().join("dlc/old.ydr"), "x").unwrap();

        let decoder = FakeDecoder::new(&[("root.rpf", vec!["new.ydr"])]);
        let (outcome, _) = run(temp_dir.path(), decoder);

        assert!(outcome.is_success());
        let tree = outcome.extracted_tree.unwrap();
        assert_eq!(tree.path, temp_dir.path().join("dlc"));
        assert!(!tree.created_by_run);
        assert_eq!(outcome.tally.stream, 2);
    }

    #[test]
    fn test_progress_messages() {
        let temp_dir = TempDir::new().unwrap();
        let decoder = Arc::new(FakeDecoder::new(&[
            ("root.rpf", vec!["a.ydr", "c.rpf"]),
            ("c.rpf", vec!["d.ydr"]),
        ]));
        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let request = ExtractionRequest::root(
            root_container(temp_dir.path()),
            decoder,
            temp_dir.path().to_path_buf(),
        );
        RecursiveExtractor::new(ClassificationRules::default())
            .with_progress(move |event| sink.lock().unwrap().push(event.clone()))
            .extract(request);

        let messages: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect();
        assert!(messages.contains(&"Extracting: root.rpf".to_string()));
        assert!(messages.contains(&"Found 1 nested containers...".to_string()));
        assert!(messages.contains(&"Processing nested container 1/1: c.rpf".to_string()));
    }
}
