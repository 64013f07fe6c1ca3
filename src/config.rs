//! Runtime configuration.
//!
//! Every component receives the parts of [`Config`] it needs at construction;
//! nothing reads process-wide state. Missing keys fall back to defaults, so an
//! empty `{}` file is a valid config.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SURGERY_BOARD_CONFIG";

/// Spreadsheet extensions picked up from the watched directory (compared
/// case-insensitively, without the dot).
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xls", "xlsx"];

/// Retry policy for source files that look locked by another writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total read attempts, including the first.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Single attempt, no waiting. Used by tests.
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory scanned (non-recursively) for spreadsheets.
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,
    /// SQLite database holding the merged record set.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Query window: records dated on or after today minus this many days.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Zero-based sheet row holding the column headers.
    #[serde(default = "default_header_row")]
    pub header_row: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Drop events whose path is a directory.
    #[serde(default = "default_true")]
    pub ignore_directory_events: bool,
    /// Run one ingestion cycle when the watcher starts.
    #[serde(default = "default_true")]
    pub ingest_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            db_path: default_db_path(),
            window_days: default_window_days(),
            header_row: default_header_row(),
            retry: RetryPolicy::default(),
            heartbeat_secs: default_heartbeat_secs(),
            debounce_ms: default_debounce_ms(),
            ignore_directory_events: true,
            ingest_on_start: true,
        }
    }
}

impl Config {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("watch_folder")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data.db")
}

fn default_window_days() -> i64 {
    10
}

fn default_header_row() -> u32 {
    2
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    2000
}

fn default_heartbeat_secs() -> u64 {
    30 * 60
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// Read a config file. Relative `watchDir`/`dbPath` values stay relative to
/// the working directory.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve configuration for the binary.
///
/// Priority:
/// 1. Explicit path (CLI argument)
/// 2. `SURGERY_BOARD_CONFIG`
/// 3. `~/.surgery-board/config.json` if it exists
/// 4. Built-in defaults
pub fn load_config(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
        return load_config_from(&path);
    }

    if let Some(home) = dirs::home_dir() {
        let path = home.join(".surgery-board").join("config.json");
        if path.exists() {
            return load_config_from(&path);
        }
    }

    log::info!("Config: no config file found, using defaults");
    Ok(Config::default())
}

/// Whether a path has one of [`SPREADSHEET_EXTENSIONS`] (case-insensitive).
pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
