use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpfSortError {
    #[error("Decoder timed out after {seconds} seconds on {}", container.display())]
    DecoderTimeout { container: PathBuf, seconds: u64 },

    #[error("Decoder failed on {} (exit code {code:?}): {diagnostics}", container.display())]
    DecoderExitFailure {
        container: PathBuf,
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("Decoder not found or not executable: {}", path.display())]
    DecoderNotFound { path: PathBuf },

    #[error("No extracted content found for {}", container.display())]
    NoContentExtracted { container: PathBuf },

    #[error("Size mismatch for {}: expected {expected_size} bytes, got {actual_size}", path.display())]
    FileIntegrityMismatch {
        path: PathBuf,
        expected_size: u64,
        actual_size: u64,
    },

    #[error("IO failure on {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Container {} is nested deeper than {max_depth} levels", container.display())]
    NestingTooDeep { container: PathBuf, max_depth: usize },

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },
}

impl RpfSortError {
    pub fn io_at<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        RpfSortError::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Decoder-level failures end the extraction call that raised them.
    pub fn is_decoder_failure(&self) -> bool {
        matches!(
            self,
            RpfSortError::DecoderTimeout { .. }
                | RpfSortError::DecoderExitFailure { .. }
                | RpfSortError::DecoderNotFound { .. }
                | RpfSortError::NoContentExtracted { .. }
        )
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for RpfSortError {
    fn user_message(&self) -> String {
        match self {
            RpfSortError::DecoderTimeout { container, seconds } => {
                format!(
                    "Extraction of {} timed out ({} seconds limit)",
                    display_name(container),
                    seconds
                )
            }
            RpfSortError::DecoderExitFailure { diagnostics, .. } => {
                if diagnostics.trim().is_empty() {
                    "Extraction failed".to_string()
                } else {
                    format!("Extraction failed:\n{}", diagnostics.trim_end())
                }
            }
            RpfSortError::DecoderNotFound { path } => {
                format!("Extraction tool not found: {}", path.display())
            }
            RpfSortError::NoContentExtracted { .. } => {
                "No extracted content found. The archive may be empty or in an unsupported format."
                    .to_string()
            }
            RpfSortError::FileIntegrityMismatch {
                path,
                expected_size,
                actual_size,
            } => {
                format!(
                    "File size mismatch: {} (expected {}, got {})",
                    display_name(path),
                    format_bytes(*expected_size),
                    format_bytes(*actual_size)
                )
            }
            RpfSortError::NestingTooDeep { container, max_depth } => {
                format!(
                    "Skipped {}: nested more than {} levels deep",
                    display_name(container),
                    max_depth
                )
            }
            RpfSortError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            RpfSortError::InvalidPath { path } => {
                format!("Invalid file path: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            RpfSortError::DecoderTimeout { .. } => Some(
                "Try a smaller or different archive, or raise the limit with --timeout.".to_string()
            ),
            RpfSortError::DecoderExitFailure { .. } => Some(
                "Check that the archive is valid and supported by the extraction tool.".to_string()
            ),
            RpfSortError::DecoderNotFound { .. } => Some(
                "Point --decoder at rpf-cli, place it next to rpfsort, or add it to your PATH.".to_string()
            ),
            RpfSortError::NoContentExtracted { .. } => Some(
                "Run the extraction tool by hand on this archive to see what it produces.".to_string()
            ),
            RpfSortError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            RpfSortError::NestingTooDeep { .. } => Some(
                "Raise rules.max_depth in the configuration file if the nesting is expected.".to_string()
            ),
            RpfSortError::Io(_) | RpfSortError::IoFailure { .. } => Some(
                "Ensure you have the necessary read/write permissions and enough free disk space.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for RpfSortError {
    fn from(error: toml::de::Error) -> Self {
        RpfSortError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RpfSortError>;

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
