use super::{ContainerDecoder, DecodeStatus};
use crate::config::DecoderConfig;
use crate::error::{Result, RpfSortError};
use std::ffi::OsStr;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_PROGRAM_NAMES: &[&str] = &["rpf-cli", "rpf-cli.exe"];

const VALIDATION_TIMEOUT: Duration = Duration::from_secs(3);

/// The archive tool run as a child process: `<program> <subcommand> <container>`,
/// with the container's folder as working directory.
#[derive(Debug, Clone)]
pub struct ExternalDecoder {
    program: PathBuf,
    subcommand: String,
    timeout: Duration,
}

impl ExternalDecoder {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            subcommand: "extract".to_string(),
            timeout: Duration::from_secs(300), // 5 minutes default
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Result<Self> {
        let program = Self::locate(config.path.as_deref())?;

        Ok(Self::new(program)
            .with_subcommand(config.subcommand.clone())
            .with_timeout(config.timeout_duration()))
    }

    pub fn with_subcommand<S: Into<String>>(mut self, subcommand: S) -> Self {
        self.subcommand = subcommand.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the tool. A configured path must exist (or resolve on `PATH`);
    /// otherwise look for the default names next to the executable, in
    /// `./tools`, in the working directory, then on `PATH`.
    pub fn locate(configured: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = configured {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }

            return which::which(path).map_err(|_| RpfSortError::DecoderNotFound {
                path: path.to_path_buf(),
            });
        }

        for dir in search_dirs() {
            for name in DEFAULT_PROGRAM_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    debug!("Found decoder at {}", candidate.display());
                    return Ok(candidate);
                }
            }
        }

        for name in DEFAULT_PROGRAM_NAMES {
            if let Ok(path) = which::which(name) {
                debug!("Found decoder on PATH at {}", path.display());
                return Ok(path);
            }
        }

        Err(RpfSortError::DecoderNotFound {
            path: PathBuf::from(DEFAULT_PROGRAM_NAMES[0]),
        })
    }

    /// Run the tool without arguments under a short bound. Anything that
    /// actually starts counts as executable.
    pub fn validate(&self) -> Result<()> {
        match block_on(self.run(&[], None, VALIDATION_TIMEOUT)) {
            DecodeStatus::NotFound { program } => {
                Err(RpfSortError::DecoderNotFound { path: program })
            }
            _ => Ok(()),
        }
    }

    async fn run(&self, args: &[&OsStr], cwd: Option<&Path>, timeout: Duration) -> DecodeStatus {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!("Cannot start {}: {}", self.program.display(), e);
                return DecodeStatus::NotFound {
                    program: self.program.clone(),
                };
            }
            Err(e) => {
                return DecodeStatus::Failed {
                    code: None,
                    diagnostics: format!("Unexpected error starting decoder: {}", e),
                }
            }
        };

        // Dropping the wait future on timeout kills the child
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return DecodeStatus::Failed {
                    code: None,
                    diagnostics: format!("Unexpected error during extraction: {}", e),
                }
            }
            Err(_) => {
                warn!("Decoder timed out after {:?}", timeout);
                return DecodeStatus::TimedOut { after: timeout };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if !stdout.trim().is_empty() {
                debug!("Decoder output: {}", stdout.trim_end());
            }
            if !stderr.trim().is_empty() {
                warn!("Decoder warnings: {}", stderr.trim_end());
            }
            return DecodeStatus::Completed;
        }

        let diagnostics = if stderr.trim().is_empty() {
            stdout.into_owned()
        } else {
            stderr.into_owned()
        };

        DecodeStatus::Failed {
            code: output.status.code(),
            diagnostics,
        }
    }
}

impl ContainerDecoder for ExternalDecoder {
    fn decode(&self, container: &Path) -> DecodeStatus {
        let cwd = container.parent().filter(|p| !p.as_os_str().is_empty());

        info!(
            "Running extraction command: {} {} {}",
            self.program.display(),
            self.subcommand,
            container.display()
        );

        let args = [OsStr::new(&self.subcommand), container.as_os_str()];
        block_on(self.run(&args, cwd, self.timeout))
    }
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.push(PathBuf::from("tools"));
    dirs.push(PathBuf::from("."));
    dirs
}

/// Drive `future` to completion from synchronous code. Must not be called
/// from inside an async task; the pipeline worker is a blocking thread.
fn block_on<F>(future: F) -> DecodeStatus
where
    F: Future<Output = DecodeStatus>,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(future),
        Err(_) => match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(future),
            Err(e) => DecodeStatus::Failed {
                code: None,
                diagnostics: format!("Failed to start decoder runtime: {}", e),
            },
        },
    }
}
