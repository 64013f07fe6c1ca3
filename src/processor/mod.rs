//! Spreadsheet ingestion: per-file row extraction and the full-merge cycle
//! that mirrors the watched folder into the record store.

pub mod extract;
pub mod merge;
