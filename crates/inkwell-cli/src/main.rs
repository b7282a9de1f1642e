//! Inkwell CLI
//!
//! Command-line interface for Inkwell - follow, edit and version shared
//! documents from the terminal.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use inkwell_core::{Config, DocumentKind};

mod commands;
mod output;

use output::{Output, OutputFormat};

/// Environment variable holding the log filter
const LOG_ENV: &str = "INKWELL_LOG";

#[derive(Parser)]
#[command(name = "inkwell")]
#[command(about = "Inkwell - real-time collaborative documents")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Follow a document and print remote edits
    Watch {
        /// Document ID
        document: String,
        /// Take version snapshots in this workspace while watching
        #[arg(short, long)]
        workspace: Option<String>,
        /// The document is a table (snapshots omit the body)
        #[arg(long)]
        table: bool,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Replace a document's content and save it
    Edit {
        /// Document ID
        document: String,
        /// New content
        content: String,
        /// Document title sent with the save
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Only broadcast the edit; skip the save
        #[arg(long)]
        no_save: bool,
    },
    /// Store a version snapshot of a document
    Snapshot {
        /// Workspace ID
        workspace: String,
        /// Document ID
        document: String,
        /// Document title
        #[arg(short = 'T', long, default_value = "")]
        title: String,
        /// Document body (ignored for tables)
        #[arg(short, long, default_value = "")]
        content: String,
        /// The document is a table (snapshots omit the body)
        #[arg(long)]
        table: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, api_url, user_id, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work on the file directly
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(cli.config.as_ref(), &output)
            }
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, cli.config.as_ref(), &output)
            }
        };
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command {
        Commands::Config { .. } => Ok(()), // Handled above
        Commands::Watch {
            document,
            workspace,
            table,
            duration,
        } => {
            commands::watch::watch(
                &config,
                document,
                workspace,
                document_kind(table),
                duration,
                &output,
            )
            .await
        }
        Commands::Edit {
            document,
            content,
            title,
            no_save,
        } => commands::edit::edit(&config, document, content, title, !no_save, &output).await,
        Commands::Snapshot {
            workspace,
            document,
            title,
            content,
            table,
        } => {
            commands::snapshot::snapshot(
                &config,
                workspace,
                document,
                document_kind(table),
                title,
                content,
                &output,
            )
            .await
        }
    }
}

fn document_kind(table: bool) -> DocumentKind {
    if table {
        DocumentKind::Table
    } else {
        DocumentKind::Page
    }
}

/// Where logs go, if not stderr
///
/// An explicit `log_file` always wins. Setting `INKWELL_LOG` without one
/// logs to `{data_dir}/inkwell.log`.
fn log_destination(config: &Config, filter_set: bool) -> Option<PathBuf> {
    config
        .log_file
        .clone()
        .or_else(|| filter_set.then(|| config.default_log_path()))
}

/// Install the tracing subscriber
///
/// The filter comes from `INKWELL_LOG` (default `warn`).
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).ok();
    let Some(log_path) = log_destination(config, env_filter.is_some()) else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };
    let filter = env_filter.unwrap_or_else(|| EnvFilter::new("warn"));

    if let Some(dir) = log_path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init();
}
