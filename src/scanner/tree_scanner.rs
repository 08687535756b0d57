use crate::error::{Result, RpfSortError};
use crate::scanner::classifier::ClassificationRules;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// File counts gathered by the pre-scan, before anything is moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeCensus {
    pub total_files: usize,
    pub ignored_files: usize,
}

impl TreeCensus {
    pub fn visitable_files(&self) -> usize {
        self.total_files - self.ignored_files
    }
}

pub struct TreeScanner<'a> {
    rules: &'a ClassificationRules,
    excluded: Vec<PathBuf>,
}

impl<'a> TreeScanner<'a> {
    pub fn new(rules: &'a ClassificationRules) -> Self {
        Self {
            rules,
            excluded: Vec::new(),
        }
    }

    /// Never descend into `dirs` (the output buckets, when they sit inside
    /// the tree being scanned).
    pub fn with_excluded_dirs<I: IntoIterator<Item = PathBuf>>(mut self, dirs: I) -> Self {
        self.excluded.extend(dirs);
        self
    }

    /// Counts every file under `root`, including those inside ignored folders.
    pub fn census(&self, root: &Path) -> Result<TreeCensus> {
        validate_root(root)?;

        let mut census = TreeCensus::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Scan error under {}: {}", root.display(), err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            census.total_files += 1;
            if self.rules.is_ignored_folder(&relative_folder(root, entry.path())) {
                census.ignored_files += 1;
            }
        }

        Ok(census)
    }

    /// Walk `root` depth-first, never entering ignored folders, and hand every
    /// remaining file to `visit`.
    pub fn walk_files<F>(&self, root: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(&DirEntry),
    {
        validate_root(root)?;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_traverse(e, root));

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => visit(&entry),
                Ok(_) => {}
                Err(err) => warn!("Scan error under {}: {}", root.display(), err),
            }
        }

        Ok(())
    }

    /// Nested containers under `root`, in directory-scan order.
    ///
    /// Containers inside an ignored folder, or whose own name matches an
    /// ignored rule, are left out. They are never decoded, so their files
    /// do not add to the skipped count.
    pub fn find_containers(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut containers = Vec::new();

        self.walk_files(root, |entry| {
            let path = entry.path();
            if !self.rules.is_container(path) {
                return;
            }

            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.rules.is_ignored_folder(relative) {
                return;
            }

            containers.push(path.to_path_buf());
        })?;

        Ok(containers)
    }

    fn should_traverse(&self, entry: &DirEntry, root: &Path) -> bool {
        if entry.depth() == 0 {
            return true;
        }

        if self.is_excluded(entry) {
            return false;
        }

        if entry.file_type().is_dir() {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            return !self.rules.is_ignored_folder(relative);
        }

        true
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && self.excluded.iter().any(|dir| dir == entry.path())
    }
}

/// Folder containing `file`, relative to `root`.
pub fn relative_folder(root: &Path, file: &Path) -> PathBuf {
    file.parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn validate_root(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(RpfSortError::InvalidPath {
            path: root.display().to_string(),
        });
    }

    if !root.is_dir() {
        return Err(RpfSortError::InvalidPath {
            path: format!("{} is not a directory", root.display()),
        });
    }

    Ok(())
}
