//! SQLite-backed record store.
//!
//! The database (default `./data.db`) holds one table, `records`, which mirrors
//! the watched folder. It is replaced wholesale inside a single `BEGIN
//! IMMEDIATE` transaction; with WAL enabled, readers on other connections see
//! either the previous table contents or the new ones, never a mix.
//!
//! Only the writer path touches the schema. Migrations run once per store, on
//! the first `replace`; `load` opens the file read-only and treats a missing
//! or outdated `records` table as an empty set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, ToSql};

use crate::types::{Column, Record, RecordSet, COLUMN_COUNT};

pub mod types;
pub use types::*;

/// How long a connection waits on a competing writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistence collaborator for the merged record set.
pub trait RecordStore: Send + Sync {
    /// Load the full record set in stored order. A store that has never been
    /// written yields an empty set.
    fn load(&self) -> Result<RecordSet, StoreError>;

    /// Atomically replace the stored record set.
    fn replace(&self, records: &RecordSet) -> Result<(), StoreError>;
}

pub struct SqliteRecordStore {
    path: PathBuf,
    /// Set once migrations have been applied through this store.
    migrated: Mutex<bool>,
}

impl SqliteRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            migrated: Mutex::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) the database for writing. The schema is migrated
    /// on the first call only.
    fn open_writer(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let mut migrated = self.migrated.lock();
        if !*migrated {
            crate::migrations::run_migrations(&conn).map_err(StoreError::Migration)?;
            *migrated = true;
        }
        Ok(conn)
    }

    fn open_reader(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// True once the current `records` layout exists. A fresh file, or one still
/// holding a legacy table, has nothing to read yet.
fn has_records_table(conn: &Connection) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('records') WHERE name = 'position'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Execute a closure within a SQLite transaction.
/// Commits on Ok, rolls back on Err.
fn with_transaction<F, T>(conn: &Connection, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    conn.execute_batch("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(val) => {
            conn.execute_batch("COMMIT")?;
            Ok(val)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn select_sql() -> String {
    let columns: Vec<&str> = Column::ALL.iter().map(|c| c.sql_name()).collect();
    format!(
        "SELECT {} FROM records ORDER BY position",
        columns.join(", ")
    )
}

fn insert_sql() -> String {
    let columns: Vec<&str> = Column::ALL.iter().map(|c| c.sql_name()).collect();
    let placeholders: Vec<String> = (1..=COLUMN_COUNT + 1).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO records (position, {}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Record::default();
    for (i, column) in Column::ALL.into_iter().enumerate() {
        // Columns are NOT NULL, but never let a null marker into a Record
        let value: Option<String> = row.get(i)?;
        record.set(column, value.unwrap_or_default());
    }
    Ok(record)
}

impl RecordStore for SqliteRecordStore {
    fn load(&self) -> Result<RecordSet, StoreError> {
        if !self.path.exists() {
            return Ok(RecordSet::empty());
        }

        let conn = self.open_reader()?;
        if !has_records_table(&conn)? {
            return Ok(RecordSet::empty());
        }
        let mut stmt = conn.prepare(&select_sql())?;
        let rows = stmt.query_map([], map_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(RecordSet::new(records))
    }

    fn replace(&self, records: &RecordSet) -> Result<(), StoreError> {
        let conn = self.open_writer()?;
        with_transaction(&conn, |conn| {
            conn.execute("DELETE FROM records", [])?;
            let mut stmt = conn.prepare(&insert_sql())?;
            for (position, record) in records.iter().enumerate() {
                let position = position as i64;
                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(COLUMN_COUNT + 1);
                values.push(&position);
                for field in record.fields() {
                    values.push(field);
                }
                stmt.execute(values.as_slice())?;
            }
            Ok(())
        })?;

        log::debug!(
            "Store: replaced records in {} ({} rows)",
            self.path.display(),
            records.len()
        );
        Ok(())
    }
}
