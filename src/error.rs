//! Error types for ingestion and configuration
//!
//! Errors are classified by recoverability:
//! - Retryable: the source file looks locked by another writer
//! - Absorbed: the source file is unreadable (contributes zero rows)
//! - Cycle-fatal: the store or the watched directory is unavailable

use std::path::PathBuf;
use thiserror::Error;

use crate::db::StoreError;
use crate::processor::merge::IngestReport;

/// Windows `ERROR_SHARING_VIOLATION` / `ERROR_LOCK_VIOLATION`.
const WINDOWS_LOCK_CODES: [i32; 2] = [32, 33];

/// Failure to read one source spreadsheet.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("File is locked or not readable yet: {path}: {reason}")]
    TransientLock { path: PathBuf, reason: String },

    #[error("Failed to read spreadsheet {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },
}

impl ExtractError {
    /// Build from an IO error, classifying lock/permission failures as transient.
    pub fn from_io(path: &std::path::Path, err: &std::io::Error) -> Self {
        if is_lock_error(err) {
            ExtractError::TransientLock {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        } else {
            ExtractError::SourceRead {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        }
    }

    /// Returns true if this error is worth retrying after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractError::TransientLock { .. })
    }

    /// Demote a transient failure to a plain read failure once retries run out.
    pub fn into_source_read(self) -> Self {
        match self {
            ExtractError::TransientLock { path, reason } => ExtractError::SourceRead {
                path,
                reason: format!("still locked after retries ({})", reason),
            },
            other => other,
        }
    }
}

/// Lock- or permission-class IO failures: another process is probably still
/// writing the file.
pub fn is_lock_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(err.kind(), ErrorKind::PermissionDenied | ErrorKind::WouldBlock)
        || err
            .raw_os_error()
            .map(|code| cfg!(windows) && WINDOWS_LOCK_CODES.contains(&code))
            .unwrap_or(false)
}

/// Failure of a whole ingestion cycle. The stored record set is unchanged.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Watched directory {path} could not be listed: {source}")]
    WatchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration loading failure (startup only).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serializable outcome of a refresh request for the API layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
}

impl From<Result<IngestReport, IngestError>> for RefreshResult {
    fn from(result: Result<IngestReport, IngestError>) -> Self {
        match result {
            Ok(report) => RefreshResult {
                ok: true,
                error: None,
                report: Some(report),
            },
            Err(e) => RefreshResult {
                ok: false,
                error: Some(e.to_string()),
                report: None,
            },
        }
    }
}
