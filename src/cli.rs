use crate::config::{CliOverrides, Config};
use crate::error::{Result, RpfSortError};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rpfsort")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract RPF archives and sort their files into flat stream/ and data/ folders")]
#[command(
    long_about = "rpfsort runs an external RPF extraction tool on an archive, recurses into \
                  every nested archive it finds, and consolidates the extracted files into \
                  two flat folders: stream/ for asset files and data/ for metadata files."
)]
#[command(after_help = "EXAMPLES:\n  \
    rpfsort mods/dlc.rpf\n  \
    rpfsort mods/dlc.rpf --decoder tools/rpf-cli --output sorted\n  \
    rpfsort mods/dlc.rpf --ignore lang,audio --max-depth 4 -v\n  \
    rpfsort --generate-config --config rpfsort.toml")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Archive to extract
    #[arg(required_unless_present_any = ["generate_config", "validate_decoder"])]
    pub archive: Option<PathBuf>,

    /// Path to the extraction tool (defaults to rpf-cli next to rpfsort, in ./tools or on PATH)
    #[arg(short, long)]
    pub decoder: Option<PathBuf>,

    /// Tool subcommand placed before the archive path
    #[arg(long)]
    pub subcommand: Option<String>,

    /// Folder that receives stream/ and data/ (defaults to the archive's folder)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Per-archive extraction timeout in seconds
    #[arg(long, help = "Timeout for each extraction tool run (seconds)")]
    pub timeout: Option<u64>,

    /// Archive file extension
    #[arg(long, help = "Extension of nested archives (default: rpf)")]
    pub extension: Option<String>,

    /// Extra folder names to ignore (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub ignore: Option<Vec<String>>,

    /// Maximum archive nesting depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Keep the extraction tool's output folders
    #[arg(long, help = "Do not remove extracted folders after sorting")]
    pub no_cleanup: bool,

    /// Skip writing extraction_report.json
    #[arg(long)]
    pub no_report: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "Show the resolved settings without extracting anything")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,

    /// Check that the extraction tool can be started, then exit
    #[arg(long)]
    pub validate_decoder: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        let ignore = self.ignore.as_ref().map(|names| {
            names
                .iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        });

        CliOverrides::new()
            .with_decoder(self.decoder.clone())
            .with_subcommand(self.subcommand.clone())
            .with_timeout(self.timeout)
            .with_output_dir(self.output.clone())
            .with_container_extension(self.extension.clone())
            .with_ignore(ignore)
            .with_max_depth(self.max_depth)
            .with_no_cleanup(self.no_cleanup)
            .with_no_report(self.no_report)
    }

    /// The archive argument, checked to be an existing file.
    pub fn archive_path(&self) -> Result<PathBuf> {
        let archive = self.archive.as_ref().ok_or_else(|| RpfSortError::InvalidPath {
            path: "no archive given".to_string(),
        })?;

        if !archive.is_file() {
            return Err(RpfSortError::InvalidPath {
                path: archive.display().to_string(),
            });
        }

        Ok(archive.clone())
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
