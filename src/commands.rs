//! Command surface consumed by the presentation layer.
//!
//! Both commands are synchronous and safe to call from any thread; they only
//! share the record store with the watcher.

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::error::RefreshResult;
use crate::processor::merge::IngestReport;
use crate::queries::records::DisplayRecord;
use crate::state::AppState;
use crate::watcher::WatchPhase;

/// Records inside the rolling window, newest surgery date first.
pub fn get_records(state: &AppState) -> Vec<DisplayRecord> {
    get_records_on(state, Local::now().date_naive())
}

/// `get_records` evaluated against an explicit "today".
pub fn get_records_on(state: &AppState, today: NaiveDate) -> Vec<DisplayRecord> {
    state.queries.query(state.store.as_ref(), today)
}

/// Run one full ingestion cycle now and report whether it succeeded.
pub fn refresh(state: &AppState) -> RefreshResult {
    log::info!("Refresh: manual ingestion requested");
    let result = state.ingestor.run(state.store.as_ref());
    if let Ok(report) = &result {
        *state.last_refresh.lock() = Some(report.clone());
    }
    RefreshResult::from(result)
}

/// Snapshot of the watcher and the last manual refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub watch_dir: String,
    pub watcher: Option<WatchPhase>,
    pub last_refresh: Option<IngestReport>,
}

pub fn get_status(state: &AppState) -> StatusView {
    StatusView {
        watch_dir: state.config.watch_dir.display().to_string(),
        watcher: state.watch_phase(),
        last_refresh: state.last_refresh.lock().clone(),
    }
}
