//! Row extraction from schedule spreadsheets (.xls / .xlsx).
//!
//! Reads the first worksheet, locates the header on the configured sheet row
//! (the third row by default; the two rows above it are a title block), and
//! turns every data row into a canonical [`Record`]. Columns are matched by
//! header label, so exports with reordered or extra columns still line up.
//! Columns missing from the sheet come through as empty fields.

use std::collections::HashSet;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::config::{Config, RetryPolicy};
use crate::error::ExtractError;
use crate::normalize;
use crate::types::{Column, ColumnKind, Record};

/// Parses spreadsheet files into records.
#[derive(Debug, Clone)]
pub struct Extractor {
    header_row: u32,
    retry: RetryPolicy,
}

impl Extractor {
    pub fn new(header_row: u32, retry: RetryPolicy) -> Self {
        Self { header_row, retry }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.header_row, config.retry)
    }

    /// Extract records, absorbing any failure.
    ///
    /// A file that cannot be read contributes zero rows; the failure is
    /// logged with the file path and never returned.
    pub fn extract(&self, path: &Path) -> Vec<Record> {
        match self.try_extract(path) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Extract: skipping {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Extract records, retrying lock-class failures per the retry policy.
    /// Exhausted retries come back as [`ExtractError::SourceRead`].
    pub fn try_extract(&self, path: &Path) -> Result<Vec<Record>, ExtractError> {
        let range = with_retry(&self.retry, path, || read_first_sheet(path))?;
        let records = rows_from_range(&range, self.header_row);
        log::debug!(
            "Extract: {} -> {} records",
            path.display(),
            records.len()
        );
        Ok(records)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
pub(crate) fn with_retry<T, F>(policy: &RetryPolicy, path: &Path, mut op: F) -> Result<T, ExtractError>
where
    F: FnMut() -> Result<T, ExtractError>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                log::warn!(
                    "Extract: read retry {}/{} for {}: {}",
                    attempt,
                    attempts,
                    path.display(),
                    e
                );
                std::thread::sleep(policy.backoff());
                attempt += 1;
            }
            Err(e) => return Err(e.into_source_read()),
        }
    }
}

// ---------------------------------------------------------------------------
// Workbook access
// ---------------------------------------------------------------------------

fn read_first_sheet(path: &Path) -> Result<Range<Data>, ExtractError> {
    // Probe with a plain open first so a file held by another writer
    // surfaces as an IO error we can classify.
    std::fs::File::open(path).map_err(|e| ExtractError::from_io(path, &e))?;

    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(path, e))?;
    match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => Ok(range),
        Some(Err(e)) => Err(workbook_error(path, e)),
        None => Err(ExtractError::SourceRead {
            path: path.to_path_buf(),
            reason: "workbook has no worksheets".to_string(),
        }),
    }
}

fn workbook_error(path: &Path, err: calamine::Error) -> ExtractError {
    match err {
        calamine::Error::Io(ref io) => ExtractError::from_io(path, io),
        calamine::Error::Xlsx(calamine::XlsxError::Io(ref io)) => ExtractError::from_io(path, io),
        other => ExtractError::SourceRead {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a worksheet range to records.
///
/// `header_row` is an absolute, zero-based sheet row. calamine trims leading
/// empty rows from a range, so positions are offset by the range start.
pub(crate) fn rows_from_range(range: &Range<Data>, header_row: u32) -> Vec<Record> {
    let start_row = range.start().map(|(row, _)| row).unwrap_or(0);
    if start_row > header_row {
        log::warn!("Extract: header row {} is empty, no columns to read", header_row + 1);
        return Vec::new();
    }

    let mut layout: Option<Vec<Option<Column>>> = None;
    let mut records = Vec::new();

    for (offset, row) in range.rows().enumerate() {
        let sheet_row = start_row as usize + offset;
        if sheet_row < header_row as usize {
            continue;
        }

        match layout {
            None => layout = Some(header_layout(row)),
            Some(ref columns) => {
                let record = row_to_record(row, columns);
                if !record.is_blank() {
                    records.push(record);
                }
            }
        }
    }

    records
}

/// Column for each header cell. Unknown labels and repeated labels (after the
/// first) map to `None`.
fn header_layout(header: &[Data]) -> Vec<Option<Column>> {
    let mut seen = HashSet::new();
    let layout: Vec<Option<Column>> = header
        .iter()
        .map(|cell| {
            let label = normalize::clean_text(&cell_to_string(cell));
            Column::from_name(&label).filter(|column| seen.insert(*column))
        })
        .collect();

    let missing: Vec<&str> = Column::ALL
        .iter()
        .filter(|c| !seen.contains(*c))
        .map(|c| c.name())
        .collect();
    if !missing.is_empty() {
        log::debug!("Extract: columns not in sheet, filled empty: {}", missing.join(", "));
    }

    layout
}

fn row_to_record(row: &[Data], layout: &[Option<Column>]) -> Record {
    let mut record = Record::default();
    for (cell, column) in row.iter().zip(layout) {
        if let Some(column) = column {
            record.set(*column, normalize_cell(*column, &cell_to_string(cell)));
        }
    }
    record
}

/// Apply the column's normalization rule to raw cell text.
pub fn normalize_cell(column: Column, raw: &str) -> String {
    match column.kind() {
        ColumnKind::Date => normalize::canonical_date(raw),
        ColumnKind::Time => normalize::canonical_time(raw),
        ColumnKind::Text => normalize::clean_text(raw),
    }
}

/// Render any cell as text before normalization, so numbers and dates are
/// never coerced by the reader.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(_) => String::new(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}
