use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::db::{RecordStore, SqliteRecordStore};
use crate::processor::merge::{IngestReport, Ingestor};
use crate::queries::records::QueryEngine;
use crate::watcher::{WatchPhase, WatchStatus};

/// Application state shared by the command surface and the watcher
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub ingestor: Ingestor,
    pub queries: QueryEngine,
    /// Set once the folder watcher is running
    pub watch_status: Mutex<Option<WatchStatus>>,
    /// Outcome of the most recent manual refresh
    pub last_refresh: Mutex<Option<IngestReport>>,
}

impl AppState {
    /// State backed by the SQLite store at `config.db_path`.
    pub fn new(config: Config) -> Self {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(config.db_path.clone()));
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn RecordStore>) -> Self {
        Self {
            ingestor: Ingestor::from_config(&config),
            queries: QueryEngine::from_config(&config),
            config,
            store,
            watch_status: Mutex::new(None),
            last_refresh: Mutex::new(None),
        }
    }

    pub fn attach_watcher(&self, status: WatchStatus) {
        *self.watch_status.lock() = Some(status);
    }

    /// Watcher phase, or `None` when no watcher is attached.
    pub fn watch_phase(&self) -> Option<WatchPhase> {
        self.watch_status.lock().as_ref().map(WatchStatus::current)
    }
}
