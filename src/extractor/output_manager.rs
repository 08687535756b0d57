use crate::error::{Result, RpfSortError};
use crate::extractor::pipeline::ExtractedTree;
use crate::extractor::tally::{ContainerFailure, MoveTally};
use crate::scanner::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const STREAM_BUCKET: &str = "stream";
pub const DATA_BUCKET: &str = "data";
pub const REPORT_FILE_NAME: &str = "extraction_report.json";

const SCRATCH_PREFIX: &str = "_temp_";
const SCRATCH_SUFFIX: &str = "_extract";

/// Scratch folder name the decoder is expected to use for a nested container.
pub fn scratch_dir_name(container_file_name: &str) -> String {
    format!("{}{}{}", SCRATCH_PREFIX, container_file_name, SCRATCH_SUFFIX)
}

pub fn is_scratch_dir_name(name: &str) -> bool {
    name.len() > SCRATCH_PREFIX.len() + SCRATCH_SUFFIX.len()
        && name.starts_with(SCRATCH_PREFIX)
        && name.ends_with(SCRATCH_SUFFIX)
}

/// The two flat output directories shared by every extraction call of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    pub stream: PathBuf,
    pub data: PathBuf,
}

impl Buckets {
    pub fn for_root(output_root: &Path) -> Self {
        Self {
            stream: output_root.join(STREAM_BUCKET),
            data: output_root.join(DATA_BUCKET),
        }
    }

    pub fn dir_for(&self, classification: Classification) -> Option<&Path> {
        match classification {
            Classification::Stream => Some(self.stream.as_path()),
            Classification::Data => Some(self.data.as_path()),
            Classification::Skip => None,
        }
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        vec![self.stream.clone(), self.data.clone()]
    }

    pub fn is_bucket(&self, path: &Path) -> bool {
        path == self.stream || path == self.data
    }

    pub fn is_bucket_name(name: &str) -> bool {
        name == STREAM_BUCKET || name == DATA_BUCKET
    }

    /// Delete both buckets and create them empty.
    pub fn recreate(&self) -> Result<()> {
        for dir in [&self.stream, &self.data] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| RpfSortError::io_at(dir, e))?;
            }
            fs::create_dir_all(dir).map_err(|e| RpfSortError::io_at(dir, e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeReport {
    pub container: PathBuf,
    pub output_root: PathBuf,
    pub stream_dir: PathBuf,
    pub data_dir: PathBuf,
    pub tally: MoveTally,
    pub absorbed_containers: Vec<PathBuf>,
    pub pruned_containers: Vec<String>,
    pub failed_containers: Vec<ContainerFailure>,
    pub cleaned_directories: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl OrganizeReport {
    pub fn has_failures(&self) -> bool {
        !self.failed_containers.is_empty()
    }
}

pub struct OutputManager {
    output_root: PathBuf,
    buckets: Buckets,
}

impl OutputManager {
    pub fn new(output_root: PathBuf) -> Self {
        let buckets = Buckets::for_root(&output_root);
        Self {
            output_root,
            buckets,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_root.join(REPORT_FILE_NAME)
    }

    pub fn ensure_output_root(&self) -> Result<()> {
        fs::create_dir_all(&self.output_root).map_err(|e| RpfSortError::io_at(&self.output_root, e))
    }

    /// Remove `stream/<name>` for every absorbed container whose raw copy
    /// made it into the stream bucket. Returns the removed names.
    pub fn prune_absorbed(&self, absorbed: &[PathBuf]) -> Vec<String> {
        let mut pruned = Vec::new();

        for container in absorbed {
            let Some(name) = container.file_name() else {
                continue;
            };
            let candidate = self.buckets.stream.join(name);

            if !candidate.is_file() {
                continue;
            }

            match fs::remove_file(&candidate) {
                Ok(()) => {
                    info!("Deleted absorbed container: {}", candidate.display());
                    pruned.push(name.to_string_lossy().to_string());
                }
                Err(e) => warn!("Could not delete {}: {}", candidate.display(), e),
            }
        }

        pruned
    }

    /// Best-effort removal of the decoded tree of `container` (only when this
    /// run created it) and of leftover scratch folders next to it. Returns
    /// the directories actually removed.
    pub fn cleanup_extracted(
        &self,
        container: &Path,
        tree: Option<&ExtractedTree>,
    ) -> Vec<PathBuf> {
        let mut removed = Vec::new();

        if let Some(tree) = tree {
            if tree.created_by_run && !self.output_root.starts_with(&tree.path) {
                remove_dir_logged(&tree.path, &mut removed);
            }
        }

        let Some(parent) = container.parent() else {
            return removed;
        };

        let entries = match fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cleanup scan of {} failed: {}", parent.display(), e);
                return removed;
            }
        };

        let mut scratch: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|entry| is_scratch_dir_name(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        scratch.sort();

        for dir in scratch {
            remove_dir_logged(&dir, &mut removed);
        }

        removed
    }

    pub fn save_report_json(&self, report: &OrganizeReport) -> Result<PathBuf> {
        let report_path = self.report_path();
        let json_content =
            serde_json::to_string_pretty(report).map_err(|e| RpfSortError::Config {
                message: format!("Failed to serialize report to JSON: {}", e),
            })?;

        fs::write(&report_path, json_content).map_err(|e| RpfSortError::io_at(&report_path, e))?;

        Ok(report_path)
    }
}

fn remove_dir_logged(dir: &Path, removed: &mut Vec<PathBuf>) {
    if !dir.is_dir() {
        return;
    }

    match fs::remove_dir_all(dir) {
        Ok(()) => removed.push(dir.to_path_buf()),
        Err(e) => warn!("Cleanup warning for {}: {}", dir.display(), e),
    }
}
