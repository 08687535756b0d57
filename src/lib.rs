pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod scanner;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, DecoderConfig, OutputConfig, RulesConfig};
pub use error::{Result, RpfSortError, UserFriendlyError};

// Core functionality re-exports
pub use decoder::{ContainerDecoder, DecodeStatus, ExternalDecoder};
pub use extractor::{
    Buckets, ExtractionOutcome, ExtractionRequest, FileMover, MoveTally, OrganizeReport,
    OutputManager, ProgressEvent, RecursiveExtractor, SafeMover, TreeConsolidator,
};
pub use scanner::{Classification, ClassificationRules, TreeScanner};
pub use ui::{OutputFormatter, OutputMode, ProgressManager};

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, info};

/// Main library interface: one archive in, sorted buckets out.
pub struct RpfSort {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl RpfSort {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        config.validate()?;

        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        // Bars would interleave with JSON on stdout consumers
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
        })
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Extract `archive`, recurse into every nested archive and sort the
    /// files into the output buckets.
    ///
    /// Returns `Err` only when the archive itself could not be processed.
    /// Nested failures are listed in the report.
    pub async fn organize(&self, archive: &Path) -> Result<OrganizeReport> {
        let started_at = Utc::now();
        let start_time = Instant::now();

        let container = archive
            .canonicalize()
            .map_err(|e| RpfSortError::io_at(archive, e))?;
        if !container.is_file() {
            return Err(RpfSortError::InvalidPath {
                path: container.display().to_string(),
            });
        }

        let decoder = ExternalDecoder::from_config(&self.config.decoder)?;
        debug!("Using decoder {}", decoder.program().display());

        let output = self.prepare_output(&container)?;

        self.output_formatter.start_operation(&format!(
            "Extracting {}",
            container
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| container.display().to_string())
        ));

        let progress_bar = self.progress_manager.create_extraction_progress();
        let extractor = {
            let pb = progress_bar.clone();
            RecursiveExtractor::from_config(&self.config)?
                .with_progress(move |event: &ProgressEvent| {
                    ui::progress::update_extraction_progress(&pb, event);
                })
        };

        let request = ExtractionRequest::root(
            container.clone(),
            Arc::new(decoder),
            output.output_root().to_path_buf(),
        );

        let outcome = task::spawn_blocking(move || extractor.extract(request))
            .await
            .map_err(|e| RpfSortError::Config {
                message: format!("Extraction task failed: {}", e),
            })?;

        let ExtractionOutcome {
            tally,
            error,
            absorbed_containers,
            failed_containers,
            extracted_tree,
        } = outcome;

        let pruned_containers = match error {
            None if self.config.output.prune_absorbed && tally.moved() > 0 => {
                output.prune_absorbed(&absorbed_containers)
            }
            _ => Vec::new(),
        };

        let cleaned_directories = if self.config.output.auto_cleanup {
            output.cleanup_extracted(&container, extracted_tree.as_ref())
        } else {
            Vec::new()
        };

        if let Some(error) = error {
            progress_bar.finish_and_clear();
            return Err(error);
        }

        ui::progress::finish_progress_with_summary(
            &progress_bar,
            &format!("Organized {} files", tally.moved()),
            start_time.elapsed(),
        );

        let report = OrganizeReport {
            container,
            output_root: output.output_root().to_path_buf(),
            stream_dir: output.buckets().stream.clone(),
            data_dir: output.buckets().data.clone(),
            tally,
            absorbed_containers,
            pruned_containers,
            failed_containers,
            cleaned_directories,
            started_at,
            finished_at: Utc::now(),
            duration: start_time.elapsed(),
        };

        if self.config.output.write_report {
            let report_path = output.save_report_json(&report)?;
            info!("Report written to {}", report_path.display());
        }

        Ok(report)
    }

    /// Show what `organize` would use for `archive` without running anything.
    pub fn dry_run(&self, archive: &Path) -> Result<()> {
        let formatter = &self.output_formatter;
        let config = &self.config;

        formatter.print_header("Dry run - nothing will be extracted");

        formatter.print_field("Archive", &archive.display().to_string());
        match ExternalDecoder::locate(config.decoder.path.as_deref()) {
            Ok(path) => formatter.print_field("Decoder", &path.display().to_string()),
            Err(e) => formatter.warning(&e.user_message()),
        }
        formatter.print_field(
            "Command",
            &format!("<decoder> {} {}", config.decoder.subcommand, archive.display()),
        );
        formatter.print_field("Timeout", &format!("{}s", config.decoder.timeout));

        let buckets = Buckets::for_root(&config.output_root_for(archive));
        formatter.print_field("Stream folder", &buckets.stream.display().to_string());
        formatter.print_field("Data folder", &buckets.data.display().to_string());

        formatter.print_field("Stream types", &config.rules.stream_extensions.join(", "));
        formatter.print_field("Data types", &config.rules.data_extensions.join(", "));
        formatter.print_field("Important folders", &config.rules.important_folders.join(", "));
        formatter.print_field("Ignored folders", &config.rules.ignored_folders.join(", "));
        formatter.print_field("Max nesting", &config.rules.max_depth.to_string());
        formatter.print_field(
            "Copy chunk size",
            &error::format_bytes(config.output.copy_chunk_size as u64),
        );
        formatter.print_field("Cleanup", &config.output.auto_cleanup.to_string());
        formatter.print_field("Report", &config.output.write_report.to_string());

        Ok(())
    }

    /// Locate the decoder and check that it starts.
    pub fn validate_decoder(&self) -> Result<PathBuf> {
        let decoder = ExternalDecoder::from_config(&self.config.decoder)?;

        let spinner = self
            .progress_manager
            .create_spinner(&format!("Starting {}", decoder.program().display()));
        let validation = decoder.validate();
        spinner.finish_and_clear();

        validation?;
        Ok(decoder.program().to_path_buf())
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)
            .map_err(|e| RpfSortError::io_at(output_path.as_ref(), e))?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn handle_error(&self, error: &RpfSortError) {
        self.progress_manager.clear();
        self.output_formatter.print_user_friendly_error(error);
    }

    /// Output root created and canonicalized, so it compares equal to paths
    /// derived from the canonical container.
    fn prepare_output(&self, container: &Path) -> Result<OutputManager> {
        let output = OutputManager::new(self.config.output_root_for(container));
        output.ensure_output_root()?;

        let root = output
            .output_root()
            .canonicalize()
            .map_err(|e| RpfSortError::io_at(output.output_root(), e))?;
        Ok(OutputManager::new(root))
    }
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
