//! Persistent job log.
//!
//! One SQLite table keyed by job id, holding an insertion timestamp and the
//! opaque payload. Every call opens its own connection and runs in its own
//! transaction, so nothing is held open between calls.
//!
//! Order comes from the rowid: a new row always gets a rowid above every row
//! still present. `added_at` is informational only, since the wall clock can
//! step backwards between two puts.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("job log path is empty")]
    EmptyPath,

    #[error("job log {op} {id}: {source}")]
    Query {
        op: &'static str,
        id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("job log {op}: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl From<StorageError> for lmc_core::LmcError {
    fn from(err: StorageError) -> Self {
        lmc_core::LmcError::Storage(err.to_string())
    }
}

/// One pending job as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLogEntry {
    pub id: String,
    /// Insertion time, unix milliseconds.
    pub added_at: i64,
    pub payload: Vec<u8>,
}

/// Durable keyed store of not-yet-acknowledged work.
pub trait JobLog: Send + Sync {
    /// Insert if absent. Re-inserting an existing id is a silent no-op; the first payload wins.
    fn put(&self, id: &str, payload: &[u8]) -> Result<(), StorageError>;

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete by id. Removing an absent id is not an error.
    fn remove(&self, id: &str) -> Result<(), StorageError>;

    /// Snapshot of every entry, oldest insertion first.
    fn read_all_ordered(&self) -> Result<Vec<JobLogEntry>, StorageError>;

    fn count(&self) -> Result<usize, StorageError>;
}

/// SQLite-backed job log.
#[derive(Debug, Clone)]
pub struct SqliteJobLog {
    path: PathBuf,
}

impl SqliteJobLog {
    /// Create the database file and table if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(StorageError::EmptyPath);
        }
        let log = Self { path };
        log.init_schema()?;
        info!(path = %log.path.display(), "Job log opened");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self, op: &'static str) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.path).map_err(|source| StorageError::Database { op, source })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|source| StorageError::Database { op, source })?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.connect("init")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id       TEXT NOT NULL PRIMARY KEY,
                added_at INTEGER NOT NULL,
                data     BLOB NOT NULL
            );",
        )
        .map_err(|source| StorageError::Database { op: "init", source })
    }
}

impl JobLog for SqliteJobLog {
    fn put(&self, id: &str, payload: &[u8]) -> Result<(), StorageError> {
        let query = |source| StorageError::Query { op: "PUT", id: id.to_string(), source };
        let mut conn = self.connect("PUT")?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query)?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO jobs (id, added_at, data) VALUES (?1, ?2, ?3)",
                params![id, chrono::Utc::now().timestamp_millis(), payload],
            )
            .map_err(query)?;
        tx.commit().map_err(query)?;
        if inserted == 0 {
            debug!(job_id = %id, "Job already journaled");
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let query = |source| StorageError::Query { op: "GET", id: id.to_string(), source };
        let conn = self.connect("GET")?;
        conn.query_row("SELECT data FROM jobs WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(query)
    }

    fn remove(&self, id: &str) -> Result<(), StorageError> {
        let query = |source| StorageError::Query { op: "REMOVE", id: id.to_string(), source };
        let mut conn = self.connect("REMOVE")?;
        let tx = conn.transaction().map_err(query)?;
        tx.execute("DELETE FROM jobs WHERE id = ?1", params![id])
            .map_err(query)?;
        tx.commit().map_err(query)?;
        Ok(())
    }

    fn read_all_ordered(&self) -> Result<Vec<JobLogEntry>, StorageError> {
        let db = |source| StorageError::Database { op: "READ_ALL", source };
        let mut conn = self.connect("READ_ALL")?;
        let tx = conn.transaction().map_err(db)?;
        let entries = {
            let mut stmt = tx
                .prepare("SELECT id, added_at, data FROM jobs ORDER BY rowid ASC")
                .map_err(db)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(JobLogEntry {
                        id: row.get(0)?,
                        added_at: row.get(1)?,
                        payload: row.get(2)?,
                    })
                })
                .map_err(db)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db)?
        };
        tx.commit().map_err(db)?;
        Ok(entries)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let conn = self.connect("COUNT")?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))
            .map_err(|source| StorageError::Database { op: "COUNT", source })?;
        Ok(count as usize)
    }
}
