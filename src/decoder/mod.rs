pub mod external;

pub use external::{ExternalDecoder, DEFAULT_PROGRAM_NAMES};

use crate::error::{Result, RpfSortError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How one decoder invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    Completed,
    TimedOut { after: Duration },
    Failed { code: Option<i32>, diagnostics: String },
    NotFound { program: PathBuf },
}

impl DecodeStatus {
    pub fn into_result(self, container: &Path) -> Result<()> {
        match self {
            DecodeStatus::Completed => Ok(()),
            DecodeStatus::TimedOut { after } => Err(RpfSortError::DecoderTimeout {
                container: container.to_path_buf(),
                seconds: after.as_secs(),
            }),
            DecodeStatus::Failed { code, diagnostics } => Err(RpfSortError::DecoderExitFailure {
                container: container.to_path_buf(),
                code,
                diagnostics,
            }),
            DecodeStatus::NotFound { program } => {
                Err(RpfSortError::DecoderNotFound { path: program })
            }
        }
    }
}

/// Turns one container file into a directory tree next to it.
///
/// Implementations block until the tree is written or the attempt fails.
pub trait ContainerDecoder: Send + Sync {
    fn decode(&self, container: &Path) -> DecodeStatus;
}
