use std::cmp::Ordering;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;

use crate::config::Config;
use crate::db::RecordStore;
use crate::normalize;
use crate::types::{Column, Record, RecordSet};

/// One record with every field in display form, keyed by canonical column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DisplayRecord(Record);

impl DisplayRecord {
    pub fn get(&self, column: Column) -> &str {
        self.0.get(column)
    }

    /// `(column name, display value)` pairs in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        Column::ALL.into_iter().map(move |c| (c.name(), self.0.get(c)))
    }
}

/// Rolling-window view over the stored record set.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine {
    window_days: i64,
}

impl QueryEngine {
    pub fn new(window_days: i64) -> Self {
        Self { window_days }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.window_days)
    }

    /// Earliest date still inside the window (inclusive).
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_signed(Duration::days(self.window_days))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Load the store and build the view. An unreadable or missing store is
    /// an empty view.
    pub fn query(&self, store: &dyn RecordStore, today: NaiveDate) -> Vec<DisplayRecord> {
        match store.load() {
            Ok(records) => self.select(&records, today),
            Err(e) => {
                log::warn!("Query: store unavailable, returning no records: {}", e);
                Vec::new()
            }
        }
    }

    /// Filter to the window, sort newest date first and earliest start first
    /// within a date, then format for display.
    pub fn select(&self, records: &RecordSet, today: NaiveDate) -> Vec<DisplayRecord> {
        let cutoff = self.cutoff(today);

        let mut in_window: Vec<(NaiveDate, NaiveTime, &Record)> = records
            .iter()
            .filter_map(|r| {
                let date = normalize::date_sort_key(r.get(Column::SurgeryDate))?;
                (date >= cutoff).then(|| {
                    (date, normalize::time_sort_key(r.get(Column::StartTime)), r)
                })
            })
            .collect();

        in_window.sort_by(|a, b| match b.0.cmp(&a.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        });

        in_window
            .into_iter()
            .map(|(_, _, record)| format_record(record))
            .collect()
    }
}

fn format_record(record: &Record) -> DisplayRecord {
    let mut display = Record::default();
    for column in Column::ALL {
        let value = record.get(column);
        let formatted = match column {
            Column::SurgeryDate => normalize::display_date(value),
            Column::StartTime | Column::EndTime => normalize::display_time(value),
            _ => value.to_string(),
        };
        if !normalize::is_display_null(&formatted) {
            display.set(column, formatted);
        }
    }
    DisplayRecord(display)
}
