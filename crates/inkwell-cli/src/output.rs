//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use inkwell_core::sync::{EditMessage, SessionStatus};
use inkwell_core::versioning::VersioningProgress;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a remote edit as it arrives
    pub fn print_edit(&self, edit: &EditMessage) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "[{}] {}: {}",
                    edit.timestamp.format("%H:%M:%S"),
                    edit.origin_user_id,
                    truncate_line(&edit.content, 60)
                );
            }
            OutputFormat::Json => match serde_json::to_string(edit) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Failed to encode edit: {}", e),
            },
            OutputFormat::Quiet => {
                println!("{}", edit.content);
            }
        }
    }

    /// Print a connection status change
    ///
    /// Human output goes to stderr so it does not interleave with edits
    /// piped from stdout.
    pub fn print_status(&self, status: &SessionStatus) {
        match self.format {
            OutputFormat::Human => {
                if status.reconnecting {
                    eprintln!(
                        "● {} (reconnecting, attempt {})",
                        status.status, status.retry_count
                    );
                } else {
                    eprintln!("● {}", status.status);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": status.status.as_str(),
                        "retry_count": status.retry_count,
                        "reconnecting": status.reconnecting
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print where the snapshot timer stands
    pub fn print_progress(&self, progress: &VersioningProgress) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "Active time: {}  Next snapshot at: {}",
                    format_ms(progress.elapsed_ms),
                    format_ms(progress.next_snapshot_ms)
                );
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "elapsed_ms": progress.elapsed_ms,
                        "next_snapshot_ms": progress.next_snapshot_ms
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Truncate a string to max chars, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

/// Render milliseconds as m:ss
fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
