use crate::error::{RpfSortError, UserFriendlyError};
use crate::extractor::OrganizeReport;
use crate::ui::progress::format_duration;
use console::{style, Emoji, Term};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &RpfSortError) {
        self.error(&error.user_message());

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    /// Final summary of one organize run. JSON mode prints the full report
    /// even when quiet, since that is the machine-readable result.
    pub fn print_organize_report(&self, report: &OrganizeReport) {
        match self.mode {
            OutputMode::Json => {
                let json_output =
                    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
                println!("{}", json_output);
            }
            _ if self.quiet => {}
            OutputMode::Human => self.print_human_report(report),
            OutputMode::Plain => self.print_plain_report(report),
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    /// One `key: value` line, used by dry runs.
    pub fn print_field(&self, key: &str, value: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human if self.use_colors => {
                println!("  {:<18} {}", style(format!("{}:", key)).dim(), value)
            }
            OutputMode::Human => println!("  {:<18} {}", format!("{}:", key), value),
            OutputMode::Json => self.print_json_object(&serde_json::json!({
                "type": "field",
                "key": key,
                "value": value
            })),
            OutputMode::Plain => println!("{}: {}", key, value),
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        #[allow(clippy::type_complexity)]
        let (emoji, color_fn): (Emoji, Box<dyn Fn(&str) -> console::StyledObject<&str>>) =
            match msg_type {
                MessageType::Success => (CHECKMARK, Box::new(|msg| style(msg).green().bold())),
                MessageType::Error => (CROSS, Box::new(|msg| style(msg).red().bold())),
                MessageType::Warning => (WARNING, Box::new(|msg| style(msg).yellow().bold())),
                MessageType::Info => (INFO, Box::new(|msg| style(msg).cyan())),
            };

        if self.use_colors {
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, color_fn(message)),
                _ => println!("{}{}", emoji, color_fn(message)),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn highlight(&self, value: String) -> String {
        if self.use_colors {
            style(value).cyan().bold().to_string()
        } else {
            value
        }
    }

    fn print_human_report(&self, report: &OrganizeReport) {
        println!();
        self.print_separator();

        let headline = if report.has_failures() {
            "Extraction completed with nested failures"
        } else {
            "Extraction completed!"
        };
        if self.use_colors {
            let styled = if report.has_failures() {
                style(headline).yellow().bold()
            } else {
                style(headline).green().bold()
            };
            println!("{} {}", styled, CHECKMARK);
        } else {
            println!("✓ {}", headline);
        }

        println!();
        println!(
            "  Stream files:    {}",
            self.highlight(report.tally.stream.to_string())
        );
        println!(
            "  Data files:      {}",
            self.highlight(report.tally.data.to_string())
        );
        println!(
            "  Skipped:         {}",
            self.highlight(report.tally.skipped.to_string())
        );
        println!(
            "  Time taken:      {}",
            self.highlight(format_duration(report.duration))
        );
        println!("  Output:          {}", report.output_root.display());
        println!("    stream/        {}", report.stream_dir.display());
        println!("    data/          {}", report.data_dir.display());

        if !report.absorbed_containers.is_empty() {
            println!();
            println!("Nested containers extracted: {}", report.absorbed_containers.len());
            for container in &report.absorbed_containers {
                println!("  - {}", display_name(container));
            }
        }

        if !report.pruned_containers.is_empty() {
            println!();
            println!("Removed raw copies from stream/:");
            for name in &report.pruned_containers {
                println!("  - {}", name);
            }
        }

        if report.has_failures() {
            println!();
            println!("Nested containers that failed:");
            for failure in &report.failed_containers {
                let name = display_name(&failure.container);
                if self.use_colors {
                    println!("  - {}: {}", style(name).yellow(), failure.message);
                } else {
                    println!("  - {}: {}", name, failure.message);
                }
            }
        }

        self.print_separator();
    }

    fn print_plain_report(&self, report: &OrganizeReport) {
        if report.has_failures() {
            println!("COMPLETED: Extraction with nested failures");
        } else {
            println!("COMPLETED: Extraction");
        }
        println!("Container: {}", report.container.display());
        println!("Output: {}", report.output_root.display());
        println!("Stream: {}", report.tally.stream);
        println!("Data: {}", report.tally.data);
        println!("Skipped: {}", report.tally.skipped);
        println!("Absorbed: {}", report.absorbed_containers.len());
        println!("Duration: {:?}", report.duration);

        for failure in &report.failed_containers {
            println!(
                "FAILED: {}: {}",
                failure.container.display(),
                failure.message
            );
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
