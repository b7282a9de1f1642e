//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use inkwell_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, server_url, api_url, api_token, user_id, \
                          autosave_debounce_ms, snapshot_interval_ms, snapshot_debug, \
                          reconnect_delays_ms, max_reconnect_attempts, handshake_timeout_ms, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "server_url": config.server_url,
                    "api_url": config.api_url,
                    "api_token": config.api_token.as_ref().map(|_| "********"),
                    "user_id": config.user_id,
                    "autosave_debounce_ms": config.autosave_debounce_ms,
                    "snapshot_interval_ms": config.snapshot_interval_ms(),
                    "snapshot_debug": config.snapshot_debug,
                    "reconnect_delays_ms": config.reconnect_delays_ms,
                    "max_reconnect_attempts": config.max_reconnect_attempts,
                    "handshake_timeout_ms": config.handshake_timeout_ms,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.server_url.as_deref().unwrap_or_default());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:               {}", config.data_dir.display());
            println!("  server_url:             {}", or_unset(&config.server_url));
            println!("  api_url:                {}", or_unset(&config.api_url));
            println!(
                "  api_token:              {}",
                if config.api_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  user_id:                {}", or_unset(&config.user_id));
            println!("  autosave_debounce_ms:   {}", config.autosave_debounce_ms);
            println!(
                "  snapshot_interval_ms:   {}{}",
                config.snapshot_interval_ms(),
                if config.snapshot_interval_ms.is_none() && config.snapshot_debug {
                    " (debug cadence)"
                } else {
                    ""
                }
            );
            println!("  reconnect_delays_ms:    {:?}", config.reconnect_delays_ms);
            println!("  max_reconnect_attempts: {}", config.max_reconnect_attempts);
            println!("  handshake_timeout_ms:   {}", config.handshake_timeout_ms);
            println!(
                "  log_file:               {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(stderr)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply_setting(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

/// Apply one `key = value` pair to `config`
fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "server_url" => config.server_url = optional(value),
        "api_url" => config.api_url = optional(value),
        "api_token" => config.api_token = optional(value),
        "user_id" => config.user_id = optional(value),
        "autosave_debounce_ms" => {
            config.autosave_debounce_ms = value
                .parse()
                .context("Invalid value for autosave_debounce_ms. Use milliseconds.")?;
        }
        "snapshot_interval_ms" => {
            config.snapshot_interval_ms = match optional(value) {
                None => None,
                Some(ms) => Some(
                    ms.parse()
                        .context("Invalid value for snapshot_interval_ms. Use milliseconds.")?,
                ),
            };
        }
        "snapshot_debug" => {
            config.snapshot_debug = value
                .parse()
                .context("Invalid value for snapshot_debug. Use 'true' or 'false'.")?;
        }
        "reconnect_delays_ms" => {
            let delays = value
                .split(',')
                .map(|ms| ms.trim().parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid value for reconnect_delays_ms. Use e.g. 5000,10000,20000")?;
            if delays.is_empty() {
                bail!("reconnect_delays_ms needs at least one delay");
            }
            config.reconnect_delays_ms = delays;
        }
        "max_reconnect_attempts" => {
            config.max_reconnect_attempts = value
                .parse()
                .context("Invalid value for max_reconnect_attempts")?;
        }
        "handshake_timeout_ms" => {
            config.handshake_timeout_ms = value
                .parse()
                .context("Invalid value for handshake_timeout_ms. Use milliseconds.")?;
        }
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn or_unset(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(not set)")
}
