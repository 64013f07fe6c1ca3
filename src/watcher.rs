//! File watcher for the schedule folder
//!
//! Watches the configured directory (non-recursively) for spreadsheet
//! create/modify events and runs a full ingestion cycle for each burst of
//! events. Cycles never overlap: the loop awaits each one before reading the
//! next event. A heartbeat keeps a liveness line in the log; it does no work.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};

use crate::config::{is_spreadsheet, Config};
use crate::db::RecordStore;
use crate::processor::merge::Ingestor;

/// Buffered trigger signals between the notify callback and the loop
const EVENT_CHANNEL_SIZE: usize = 64;

/// Where the coordinator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchPhase {
    Idle,
    Triggered,
    Ingesting,
}

/// Shared, cheaply cloneable view of the coordinator's phase.
#[derive(Debug, Clone)]
pub struct WatchStatus(Arc<Mutex<WatchPhase>>);

impl WatchStatus {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(WatchPhase::Idle)))
    }

    pub fn current(&self) -> WatchPhase {
        *self.0.lock()
    }

    fn set(&self, phase: WatchPhase) {
        *self.0.lock() = phase;
    }
}

/// Decides which notify events start an ingestion cycle.
#[derive(Debug, Clone, Copy)]
pub struct WatchFilter {
    pub ignore_directories: bool,
}

impl WatchFilter {
    pub fn is_trigger(&self, event: &Event) -> bool {
        match event.kind {
            EventKind::Create(CreateKind::Folder) if self.ignore_directories => false,
            EventKind::Create(_) | EventKind::Modify(_) => event
                .paths
                .iter()
                .any(|p| self.is_relevant_path(p)),
            _ => false,
        }
    }

    fn is_relevant_path(&self, path: &Path) -> bool {
        if !is_spreadsheet(path) || is_temp_file(path) {
            return false;
        }
        !(self.ignore_directories && path.is_dir())
    }
}

/// Hidden files and Office owner files (`~$name.xlsx`).
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') || n.starts_with("~$"))
        .unwrap_or(false)
}

/// Handle to a running watcher.
pub struct WatchHandle {
    pub task: JoinHandle<()>,
    pub status: WatchStatus,
}

pub struct WatchCoordinator {
    watch_dir: PathBuf,
    ingestor: Arc<Ingestor>,
    store: Arc<dyn RecordStore>,
    filter: WatchFilter,
    debounce: Duration,
    heartbeat: Duration,
    ingest_on_start: bool,
    status: WatchStatus,
}

impl WatchCoordinator {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            ingestor: Arc::new(Ingestor::from_config(config)),
            store,
            filter: WatchFilter {
                ignore_directories: config.ignore_directory_events,
            },
            debounce: config.debounce(),
            heartbeat: config.heartbeat(),
            ingest_on_start: config.ingest_on_start,
            status: WatchStatus::new(),
        }
    }

    pub fn status(&self) -> WatchStatus {
        self.status.clone()
    }

    /// Start watching. Must be called inside a tokio runtime.
    ///
    /// The filesystem watch is registered before this returns, so changes
    /// made afterwards are seen. The loop runs until `shutdown` resolves or
    /// the event source closes; an in-flight cycle finishes first.
    pub fn start<F>(self, shutdown: F) -> Result<WatchHandle, notify::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.watch_dir.exists() {
            std::fs::create_dir_all(&self.watch_dir).map_err(notify::Error::io)?;
            log::info!("Watcher: created {}", self.watch_dir.display());
        }

        let (fs_tx, fs_rx) = mpsc::channel::<()>(EVENT_CHANNEL_SIZE);
        let filter = self.filter;
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if filter.is_trigger(&event) {
                        // Full channel means a cycle is already pending
                        let _ = fs_tx.try_send(());
                    }
                }
                Err(e) => log::warn!("Watcher: notify error: {}", e),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.watch_dir, RecursiveMode::NonRecursive)?;
        log::info!("Watcher: watching {} for changes", self.watch_dir.display());

        let status = self.status();
        let task = tokio::spawn(self.run(watcher, fs_rx, shutdown));
        Ok(WatchHandle { task, status })
    }

    async fn run<F>(self, watcher: RecommendedWatcher, mut fs_rx: mpsc::Receiver<()>, shutdown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Dropping the watcher would stop event delivery
        let _watcher = watcher;

        if self.ingest_on_start {
            self.run_cycle().await;
        }

        let period = self.heartbeat.max(Duration::from_secs(1));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Watcher: shutdown requested");
                    break;
                }
                _ = heartbeat.tick() => {
                    log::info!("Watcher: heartbeat, watching {}", self.watch_dir.display());
                }
                event = fs_rx.recv() => {
                    if event.is_none() {
                        break; // Channel closed, watcher dropped
                    }
                    self.status.set(WatchPhase::Triggered);

                    // Debounce: drain any events that arrive within the window
                    sleep(self.debounce).await;
                    while fs_rx.try_recv().is_ok() {}

                    self.run_cycle().await;
                }
            }
        }

        log::info!("Watcher: stopped");
    }

    /// Run one ingestion cycle on the blocking pool and log the outcome.
    /// Failures are logged, never propagated, so the loop keeps running.
    async fn run_cycle(&self) {
        self.status.set(WatchPhase::Ingesting);
        log::info!("Watcher: re-ingesting all spreadsheets");

        let ingestor = Arc::clone(&self.ingestor);
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || ingestor.run(store.as_ref())).await {
            Ok(Ok(report)) => log::info!(
                "Watcher: store updated ({} rows from {} files)",
                report.rows_stored,
                report.files_seen
            ),
            Ok(Err(e)) => log::error!("Watcher: ingestion cycle failed: {}", e),
            Err(e) => log::error!("Watcher: ingestion task panicked: {}", e),
        }

        self.status.set(WatchPhase::Idle);
    }
}

/// Start the folder watcher for `config`, persisting into `store`.
pub fn start_watcher<F>(
    config: &Config,
    store: Arc<dyn RecordStore>,
    shutdown: F,
) -> Result<WatchHandle, notify::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    WatchCoordinator::new(config, store).start(shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::db::{SqliteRecordStore, StoreError};
    use crate::test_support::{schedule_row, write_schedule};
    use crate::types::RecordSet;
    use notify::event::{DataChange, ModifyKind, RemoveKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    fn filter() -> WatchFilter {
        WatchFilter {
            ignore_directories: true,
        }
    }

    fn test_config(watch_dir: &Path, db_path: &Path) -> Config {
        Config {
            watch_dir: watch_dir.to_path_buf(),
            db_path: db_path.to_path_buf(),
            retry: RetryPolicy::no_retry(),
            debounce_ms: 50,
            heartbeat_secs: 3600,
            ingest_on_start: false,
            ..Config::default()
        }
    }

    async fn wait_for_rows(store: &SqliteRecordStore, expected: usize) -> bool {
        for _ in 0..200 {
            if store.load().map(|s| s.len() == expected).unwrap_or(false) {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[test]
    fn test_create_and_modify_of_spreadsheet_trigger() {
        let path = Path::new("/watch/schedule.xlsx");
        assert!(filter().is_trigger(&event(EventKind::Create(CreateKind::File), path)));
        assert!(filter().is_trigger(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            path
        )));
        assert!(filter().is_trigger(&event(
            EventKind::Create(CreateKind::Any),
            Path::new("/watch/OLD.XLS")
        )));
    }

    #[test]
    fn test_other_events_and_files_ignored() {
        let path = Path::new("/watch/schedule.xlsx");
        assert!(!filter().is_trigger(&event(EventKind::Remove(RemoveKind::File), path)));
        assert!(!filter().is_trigger(&event(
            EventKind::Create(CreateKind::File),
            Path::new("/watch/notes.txt")
        )));
        assert!(!filter().is_trigger(&event(
            EventKind::Create(CreateKind::File),
            Path::new("/watch/~$schedule.xlsx")
        )));
        assert!(!filter().is_trigger(&event(
            EventKind::Modify(ModifyKind::Any),
            Path::new("/watch/.schedule.xlsx")
        )));
    }

    #[test]
    fn test_directory_events_follow_filter_setting() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("archive.xlsx");
        std::fs::create_dir(&sub).unwrap();

        let folder_created = event(EventKind::Create(CreateKind::Folder), &sub);
        let folder_modified = event(EventKind::Modify(ModifyKind::Any), &sub);
        assert!(!filter().is_trigger(&folder_created));
        assert!(!filter().is_trigger(&folder_modified));

        let permissive = WatchFilter {
            ignore_directories: false,
        };
        assert!(permissive.is_trigger(&folder_created));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_initial_ingest_and_shutdown() {
        let watch = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        let db_path = db.path().join("data.db");
        write_schedule(
            &watch.path().join("week.xlsx"),
            &[schedule_row("2024-06-15", "09:00", "", "A")],
        );

        let config = Config {
            ingest_on_start: true,
            ..test_config(watch.path(), &db_path)
        };
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let store = Arc::new(SqliteRecordStore::new(&db_path));
        let handle = start_watcher(&config, store, async move {
            let _ = stop_rx.await;
        })
        .unwrap();

        let reader = SqliteRecordStore::new(&db_path);
        assert!(wait_for_rows(&reader, 1).await);

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.task)
            .await
            .expect("watcher should stop on shutdown")
            .unwrap();
        assert_eq!(handle.status.current(), WatchPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_file_triggers_ingest() {
        let watch = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        let db_path = db.path().join("data.db");
        let config = test_config(watch.path(), &db_path);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let store = Arc::new(SqliteRecordStore::new(&db_path));
        let handle = start_watcher(&config, store, async move {
            let _ = stop_rx.await;
        })
        .unwrap();

        write_schedule(
            &watch.path().join("week.xlsx"),
            &[
                schedule_row("2024-06-15", "09:00", "", "A"),
                schedule_row("2024-06-15", "10:00", "", "B"),
            ],
        );

        let reader = SqliteRecordStore::new(&db_path);
        assert!(wait_for_rows(&reader, 2).await, "watcher should ingest new file");

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.task)
            .await
            .expect("watcher should stop on shutdown")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_creates_missing_watch_dir() {
        let root = tempfile::tempdir().unwrap();
        let watch_dir = root.path().join("incoming");
        let config = test_config(&watch_dir, &root.path().join("data.db"));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let store = Arc::new(SqliteRecordStore::new(root.path().join("data.db")));
        let handle = start_watcher(&config, store, async move {
            let _ = stop_rx.await;
        })
        .unwrap();
        assert!(watch_dir.is_dir());

        stop_tx.send(()).unwrap();
        handle.task.await.unwrap();
    }

    /// Store whose first `replace` fails; later calls reach the database.
    struct FailsOnceStore {
        inner: SqliteRecordStore,
        replace_calls: AtomicUsize,
    }

    impl RecordStore for FailsOnceStore {
        fn load(&self) -> Result<RecordSet, StoreError> {
            self.inner.load()
        }

        fn replace(&self, records: &RecordSet) -> Result<(), StoreError> {
            if self.replace_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::Migration("disk full".to_string()));
            }
            self.inner.replace(records)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_cycle_keeps_loop_running() {
        let watch = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        let db_path = db.path().join("data.db");
        let config = Config {
            ingest_on_start: true,
            ..test_config(watch.path(), &db_path)
        };

        let store = Arc::new(FailsOnceStore {
            inner: SqliteRecordStore::new(&db_path),
            replace_calls: AtomicUsize::new(0),
        });
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = start_watcher(&config, store.clone(), async move {
            let _ = stop_rx.await;
        })
        .unwrap();

        // Wait for the initial cycle to hit the failing replace
        for _ in 0..200 {
            if store.replace_calls.load(Ordering::SeqCst) >= 1
                && handle.status.current() == WatchPhase::Idle
            {
                break;
            }
            sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(store.replace_calls.load(Ordering::SeqCst), 1);
        assert!(!handle.task.is_finished(), "loop must survive a failed cycle");

        write_schedule(
            &watch.path().join("week.xlsx"),
            &[schedule_row("2024-06-15", "09:00", "", "A")],
        );
        let reader = SqliteRecordStore::new(&db_path);
        assert!(wait_for_rows(&reader, 1).await, "next event should still ingest");
        assert!(!handle.task.is_finished());

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.task)
            .await
            .expect("watcher should stop on shutdown")
            .unwrap();
    }
}
