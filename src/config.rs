use crate::error::{Result, RpfSortError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub rules: RulesConfig,
    pub output: OutputConfig,
    pub decoder: DecoderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesConfig {
    pub stream_extensions: Vec<String>,
    pub data_extensions: Vec<String>,
    pub important_folders: Vec<String>,
    pub ignored_folders: Vec<String>,
    pub container_extension: String,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<PathBuf>,
    pub auto_cleanup: bool,
    pub prune_absorbed: bool,
    pub write_report: bool,
    pub copy_chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecoderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub subcommand: String,
    pub timeout: u64,
    pub output_folder: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules: RulesConfig::default(),
            output: OutputConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            stream_extensions: strings(&[
                "yft", "ytd", "ydr", "ydd", "ybn", "ymap", "ytyp", "awc", "cut", "rel", "ynv",
                "ycd", "ynd", "ypdb", "ysc", "yvr", "xtd",
            ]),
            data_extensions: strings(&["meta", "xml", "dat"]),
            important_folders: strings(&["vehicles", "weapons", "peds", "props"]),
            ignored_folders: strings(&[
                "audio",
                "lang",
                "common.rpf",
                "x64a.rpf",
                "x64b.rpf",
                "x64c.rpf",
                "x64d.rpf",
                "x64e.rpf",
                "x64f.rpf",
                "x64g.rpf",
                "dlc_patch",
                "update",
                "platform",
            ]),
            container_extension: "rpf".to_string(),
            max_depth: 16,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_directory: None, // Next to the archive
            auto_cleanup: true,
            prune_absorbed: true,
            write_report: true,
            copy_chunk_size: 8 * 1024 * 1024, // 8MB
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            path: None,
            subcommand: "extract".to_string(),
            timeout: 300, // 5 minutes
            output_folder: "dlc".to_string(),
        }
    }
}

impl DecoderConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(RpfSortError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RpfSortError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| RpfSortError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["rpfsort.toml", ".rpfsort.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref decoder) = cli_args.decoder {
            self.decoder.path = Some(decoder.clone());
        }

        if let Some(ref subcommand) = cli_args.subcommand {
            self.decoder.subcommand = subcommand.clone();
        }

        if let Some(timeout) = cli_args.timeout {
            self.decoder.timeout = timeout;
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.base_directory = Some(output_dir.clone());
        }

        if let Some(ref extension) = cli_args.container_extension {
            self.rules.container_extension = normalize_extension(extension);
        }

        if let Some(ref ignore) = cli_args.ignore {
            self.rules.ignored_folders.extend(ignore.iter().cloned());
        }

        if let Some(max_depth) = cli_args.max_depth {
            self.rules.max_depth = max_depth;
        }

        if cli_args.no_cleanup {
            self.output.auto_cleanup = false;
        }

        if cli_args.no_report {
            self.output.write_report = false;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| RpfSortError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| RpfSortError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if normalize_extension(&self.rules.container_extension).is_empty() {
            return Err(RpfSortError::Config {
                message: "Container extension must not be empty".to_string(),
            });
        }

        let stream: HashSet<String> = self
            .rules
            .stream_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect();
        let mut overlap: Vec<String> = self
            .rules
            .data_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| stream.contains(e))
            .collect();
        if !overlap.is_empty() {
            overlap.sort();
            return Err(RpfSortError::Config {
                message: format!(
                    "Extensions cannot be both stream and data: {}",
                    overlap.join(", ")
                ),
            });
        }

        if self.decoder.timeout == 0 {
            return Err(RpfSortError::Config {
                message: "Decoder timeout must be greater than 0".to_string(),
            });
        }

        if self.output.copy_chunk_size == 0 {
            return Err(RpfSortError::Config {
                message: "Copy chunk size must be greater than 0".to_string(),
            });
        }

        if self.rules.max_depth == 0 {
            return Err(RpfSortError::Config {
                message: "Maximum nesting depth must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Where the buckets go for `container`: the configured base directory,
    /// else the archive's own folder.
    pub fn output_root_for(&self, container: &Path) -> PathBuf {
        match self.output.base_directory {
            Some(ref base) => base.clone(),
            None => container
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

pub(crate) fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub decoder: Option<PathBuf>,
    pub subcommand: Option<String>,
    pub timeout: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub container_extension: Option<String>,
    pub ignore: Option<Vec<String>>,
    pub max_depth: Option<usize>,
    pub no_cleanup: bool,
    pub no_report: bool,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder(mut self, decoder: Option<PathBuf>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_subcommand(mut self, subcommand: Option<String>) -> Self {
        self.subcommand = subcommand;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_container_extension(mut self, extension: Option<String>) -> Self {
        self.container_extension = extension;
        self
    }

    pub fn with_ignore(mut self, ignore: Option<Vec<String>>) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_no_cleanup(mut self, no_cleanup: bool) -> Self {
        self.no_cleanup = no_cleanup;
        self
    }

    pub fn with_no_report(mut self, no_report: bool) -> Self {
        self.no_report = no_report;
        self
    }
}
