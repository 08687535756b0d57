use clap::Parser;
use rpfsort::{Cli, OutputFormatter, OutputMode, RpfSort, RpfSortError, UserFriendlyError};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    setup_logging(cli.verbosity_level());

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let rpfsort = match RpfSort::from_cli(&cli) {
        Ok(rpfsort) => rpfsort,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.validate_decoder {
        return handle_validate_decoder(&rpfsort);
    }

    let archive = match cli.archive_path() {
        Ok(archive) => archive,
        Err(e) => {
            rpfsort.handle_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return match rpfsort.dry_run(&archive) {
            Ok(()) => 0,
            Err(e) => {
                rpfsort.handle_error(&e);
                exit_code_for(&e)
            }
        };
    }

    match rpfsort.organize(&archive).await {
        Ok(report) => {
            rpfsort.output_formatter().print_organize_report(&report);

            if report.has_failures() {
                2 // Completed, some nested archives failed
            } else {
                0
            }
        }
        Err(e) => {
            rpfsort.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &RpfSortError) -> i32 {
    match error {
        RpfSortError::DecoderNotFound { .. } => 3,
        RpfSortError::DecoderTimeout { .. } => 4,
        RpfSortError::DecoderExitFailure { .. } => 5,
        RpfSortError::NoContentExtracted { .. } => 6,
        RpfSortError::Config { .. } => 7,
        RpfSortError::InvalidPath { .. } => 8,
        _ => 1,
    }
}

/// Diagnostics go to stderr. `RUST_LOG` wins over `-v`.
fn setup_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "rpfsort=warn",
        1 => "rpfsort=info",
        _ => "rpfsort=debug",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "rpfsort.toml".to_string());

    match RpfSort::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  rpfsort <archive.rpf> --config {}", config_path);
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_validate_decoder(rpfsort: &RpfSort) -> i32 {
    match rpfsort.validate_decoder() {
        Ok(path) => {
            rpfsort
                .output_formatter()
                .success(&format!("Extraction tool is usable: {}", path.display()));
            0
        }
        Err(e) => {
            rpfsort.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn print_startup_error(error: &RpfSortError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_generate_config_command() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let cli = Cli::parse_from([
            "rpfsort",
            "--generate-config",
            "--config",
            config_path.to_str().unwrap(),
        ]);

        assert_eq!(handle_generate_config(&cli), 0);

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[rules]"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code_for(&RpfSortError::DecoderNotFound {
                path: PathBuf::from("rpf-cli")
            }),
            3
        );
        assert_eq!(
            exit_code_for(&RpfSortError::NoContentExtracted {
                container: PathBuf::from("dlc.rpf")
            }),
            6
        );
        assert_eq!(
            exit_code_for(&RpfSortError::Config {
                message: "bad".to_string()
            }),
            7
        );
        assert_eq!(
            exit_code_for(&RpfSortError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"))),
            1
        );
    }
}
