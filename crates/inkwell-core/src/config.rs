//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/inkwell/config.toml)
//! 3. Environment variables (INKWELL_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::ReconnectPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "INKWELL";

/// Snapshot cadence used while debugging versioning
pub const DEBUG_SNAPSHOT_INTERVAL_MS: u64 = 30_000;

/// Snapshot cadence used in production
pub const PRODUCTION_SNAPSHOT_INTERVAL_MS: u64 = 300_000;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local data (logs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Collaboration WebSocket endpoint (ws:// or wss://)
    #[serde(default)]
    pub server_url: Option<String>,

    /// Base URL of the document HTTP API
    #[serde(default)]
    pub api_url: Option<String>,

    /// Bearer token for the document API
    #[serde(default)]
    pub api_token: Option<String>,

    /// Acting user, used for echo suppression
    #[serde(default)]
    pub user_id: Option<String>,

    /// Autosave debounce window
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,

    /// Explicit snapshot interval, overrides the debug/production cadence
    #[serde(default)]
    pub snapshot_interval_ms: Option<u64>,

    /// Use the fast debug snapshot cadence
    #[serde(default)]
    pub snapshot_debug: bool,

    /// Backoff ladder between reconnect attempts; the last entry is the cap
    #[serde(default = "default_reconnect_delays_ms")]
    pub reconnect_delays_ms: Vec<u64>,

    /// Retries before the session gives up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Time allowed for transport open plus STOMP handshake
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Log file path (defaults to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server_url: None,
            api_url: None,
            api_token: None,
            user_id: None,
            autosave_debounce_ms: default_autosave_debounce_ms(),
            snapshot_interval_ms: None,
            snapshot_debug: false,
            reconnect_delays_ms: default_reconnect_delays_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (INKWELL_SERVER_URL, INKWELL_API_URL, ...)
    /// 2. Config file (~/.config/inkwell/config.toml or INKWELL_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            self.server_url = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            self.api_url = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_API_TOKEN", ENV_PREFIX)) {
            self.api_token = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_USER_ID", ENV_PREFIX)) {
            self.user_id = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SNAPSHOT_DEBUG", ENV_PREFIX)) {
            self.snapshot_debug = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Ok(val) = std::env::var(format!("{}_SNAPSHOT_INTERVAL_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.snapshot_interval_ms = Some(ms);
            }
        }
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with INKWELL_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("inkwell")
            .join("config.toml")
    }

    /// Debounce window for autosave
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Active-time interval between version snapshots
    pub fn snapshot_interval_ms(&self) -> u64 {
        match self.snapshot_interval_ms {
            Some(ms) => ms,
            None if self.snapshot_debug => DEBUG_SNAPSHOT_INTERVAL_MS,
            None => PRODUCTION_SNAPSHOT_INTERVAL_MS,
        }
    }

    /// Reconnect policy built from the backoff settings
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delays: self
                .reconnect_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_retries: self.max_reconnect_attempts,
        }
    }

    /// Handshake timeout
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Default log file location inside the data directory
    pub fn default_log_path(&self) -> PathBuf {
        self.data_dir.join("inkwell.log")
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("inkwell")
}

fn default_autosave_debounce_ms() -> u64 {
    500
}

fn default_reconnect_delays_ms() -> Vec<u64> {
    vec![5_000, 10_000, 20_000, 30_000]
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "INKWELL_DATA_DIR",
        "INKWELL_SERVER_URL",
        "INKWELL_API_URL",
        "INKWELL_API_TOKEN",
        "INKWELL_USER_ID",
        "INKWELL_SNAPSHOT_DEBUG",
        "INKWELL_SNAPSHOT_INTERVAL_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.server_url.is_none());
        assert_eq!(config.autosave_debounce(), Duration::from_millis(500));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.snapshot_interval_ms(), PRODUCTION_SNAPSHOT_INTERVAL_MS);
        assert!(config.data_dir.ends_with("inkwell"));
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let config = Config::default();
        let policy = config.reconnect_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delays.first(), Some(&Duration::from_secs(5)));
        assert_eq!(policy.delays.last(), Some(&Duration::from_secs(30)));
    }

    #[test]
    fn test_snapshot_cadence_selection() {
        let mut config = Config {
            snapshot_debug: true,
            ..Config::default()
        };
        assert_eq!(config.snapshot_interval_ms(), DEBUG_SNAPSHOT_INTERVAL_MS);

        config.snapshot_interval_ms = Some(1_234);
        assert_eq!(config.snapshot_interval_ms(), 1_234);
    }

    #[test]
    fn test_env_override_urls() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("INKWELL_SERVER_URL", "ws://localhost:8080/ws");
        env::set_var("INKWELL_USER_ID", "alice");
        config.apply_env_overrides();
        assert_eq!(config.server_url.as_deref(), Some("ws://localhost:8080/ws"));
        assert_eq!(config.user_id.as_deref(), Some("alice"));

        // Empty string clears it
        env::set_var("INKWELL_SERVER_URL", "");
        config.apply_env_overrides();
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_env_override_snapshot_debug() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("INKWELL_SNAPSHOT_DEBUG", "1");
        config.apply_env_overrides();
        assert!(config.snapshot_debug);
        assert_eq!(config.snapshot_interval_ms(), DEBUG_SNAPSHOT_INTERVAL_MS);

        env::set_var("INKWELL_SNAPSHOT_DEBUG", "false");
        config.apply_env_overrides();
        assert!(!config.snapshot_debug);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_url = "ws://example.com/ws"
            api_url = "http://example.com/api"
            autosave_debounce_ms = 250
            reconnect_delays_ms = [100, 200]
            max_reconnect_attempts = 2
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url.as_deref(), Some("ws://example.com/ws"));
        assert_eq!(config.autosave_debounce_ms, 250);
        assert_eq!(config.reconnect_policy().delays.len(), 2);
        assert_eq!(config.max_reconnect_attempts, 2);
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            server_url: Some("ws://sync.example.com".to_string()),
            user_id: Some("bob".to_string()),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.server_url, config.server_url);
        assert_eq!(loaded.user_id, config.user_id);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.server_url.is_none());
        assert_eq!(config.autosave_debounce_ms, 500);
    }
}
