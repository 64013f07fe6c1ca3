//! Full-merge ingestion cycle.
//!
//! Every cycle re-reads every spreadsheet in the watched directory, builds the
//! candidate record set in memory, and swaps it into the store in one
//! transaction. The store mirrors the folder: files that disappear take their
//! rows with them, and an empty folder yields an empty store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{is_spreadsheet, Config};
use crate::db::RecordStore;
use crate::error::IngestError;
use crate::processor::extract::Extractor;
use crate::types::{Record, RecordSet};

/// Summary of one ingestion cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_failed: usize,
    pub rows_extracted: usize,
    pub rows_stored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Owns the read-merge-replace transaction for the record set.
pub struct Ingestor {
    watch_dir: PathBuf,
    extractor: Extractor,
}

impl Ingestor {
    pub fn new(watch_dir: impl Into<PathBuf>, extractor: Extractor) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            extractor,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.watch_dir.clone(), Extractor::from_config(config))
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Run one cycle: extract all files, deduplicate, replace the store.
    ///
    /// Per-file failures are logged and counted; only a directory listing or
    /// store failure aborts the cycle, in which case the store is untouched.
    pub fn run(&self, store: &dyn RecordStore) -> Result<IngestReport, IngestError> {
        let files = list_spreadsheets(&self.watch_dir)?;
        let mut report = IngestReport {
            files_seen: files.len(),
            ..IngestReport::default()
        };

        let mut rows = Vec::new();
        for file in &files {
            match self.extractor.try_extract(file) {
                Ok(records) => {
                    log::debug!("Ingest: {} rows from {}", records.len(), file.display());
                    rows.extend(records);
                }
                Err(e) => {
                    log::warn!("Ingest: {} contributed no rows: {}", file.display(), e);
                    report.files_failed += 1;
                }
            }
        }
        report.rows_extracted = rows.len();

        let merged = dedup_keep_last(rows);
        report.rows_stored = merged.len();
        store.replace(&merged)?;
        report.completed_at = Some(Utc::now());

        log::info!(
            "Ingest: {} files ({} failed), {} rows extracted, {} stored",
            report.files_seen,
            report.files_failed,
            report.rows_extracted,
            report.rows_stored
        );
        Ok(report)
    }
}

/// Spreadsheets directly inside `dir`, sorted by file name.
pub fn list_spreadsheets(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let entries = std::fs::read_dir(dir).map_err(|source| IngestError::WatchDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_spreadsheet(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Drop field-identical duplicates, keeping each record at the position of
/// its last occurrence.
pub fn dedup_keep_last(rows: Vec<Record>) -> RecordSet {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut kept: Vec<Record> = rows
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.clone()))
        .collect();
    kept.reverse();
    RecordSet::new(kept)
}
