//! SQLite ordered key-value store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;

use crate::lock::StoreLock;
use crate::pool::ReaderPool;
use crate::{Error, KeyRange, Op, Result, Scan, Snapshot, WriteBatch};

const DB_FILE: &str = "records.db";
const FORMAT_VERSION: &str = "1";

/// Tuning knobs for an open store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    /// How long a write waits for a busy database before failing.
    pub busy_timeout_ms: u64,
    /// Entries fetched per round trip while scanning.
    pub page_size: usize,
    /// Reader connections kept open between snapshots.
    pub max_idle_readers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            page_size: 256,
            max_idle_readers: 4,
        }
    }
}

/// Entry counts of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub live: u64,
    pub tombstones: u64,
}

/// Durable ordered key-value storage in a directory.
///
/// Writes go through a single connection and are fully synced before they
/// return. Reads use separate read-only connections, so they never wait
/// for the writer.
pub struct Storage {
    dir: PathBuf,
    options: Options,
    writer: Mutex<Connection>,
    readers: Arc<ReaderPool>,
    _lock: StoreLock,
}

impl Storage {
    /// Open or create a store in `dir` with default options.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(dir, Options::default())
    }

    /// Open or create a store in `dir`.
    ///
    /// Fails with [`Error::Locked`] while another handle owns the directory.
    pub fn open_with(dir: impl AsRef<Path>, options: Options) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let lock = StoreLock::acquire(dir)?;

        let db_path = dir.join(DB_FILE);
        let busy_timeout = Duration::from_millis(options.busy_timeout_ms);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            return Err(Error::IncompatibleFormat {
                reason: format!("journal mode '{mode}' instead of WAL"),
            });
        }
        conn.pragma_update(None, "synchronous", "FULL")?;
        init_schema(&conn)?;

        tracing::info!(path = %dir.display(), "Opened store");

        Ok(Self {
            dir: dir.to_path_buf(),
            readers: Arc::new(ReaderPool::new(db_path, busy_timeout, options.max_idle_readers)),
            options,
            writer: Mutex::new(conn),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Store `value` under `key`, replacing any previous value or tombstone.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writer.lock().execute(
            "INSERT OR REPLACE INTO entries (key, value, deleted) VALUES (?1, ?2, 0)",
            params![key, value],
        )?;
        tracing::trace!(key_len = key.len(), value_len = value.len(), "put");
        Ok(())
    }

    /// Write a tombstone for `key`. Deleting an absent key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.writer.lock().execute(
            "INSERT OR REPLACE INTO entries (key, value, deleted) VALUES (?1, NULL, 1)",
            [key],
        )?;
        tracing::trace!(key_len = key.len(), "delete");
        Ok(())
    }

    /// Apply every operation of `batch` in one transaction.
    pub fn write(&self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        {
            let mut put = tx.prepare_cached(
                "INSERT OR REPLACE INTO entries (key, value, deleted) VALUES (?1, ?2, 0)",
            )?;
            let mut delete = tx.prepare_cached(
                "INSERT OR REPLACE INTO entries (key, value, deleted) VALUES (?1, NULL, 1)",
            )?;
            for op in batch.iter() {
                match op {
                    Op::Put { key, value } => put.execute(params![key, value])?,
                    Op::Delete { key } => delete.execute([key])?,
                };
            }
        }
        tx.commit()?;
        tracing::debug!(ops = batch.len(), "Committed write batch");
        Ok(())
    }

    /// Read the latest committed value of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.readers.acquire()?;
        let value = conn
            .prepare_cached("SELECT value FROM entries WHERE key = ?1 AND deleted = 0")?
            .query_row([key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Take a point-in-time read view.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Snapshot::begin(self.readers.acquire()?, self.options.page_size)
    }

    /// Scan `range` on a fresh snapshot.
    pub fn scan(&self, range: KeyRange) -> Result<Scan<Snapshot>> {
        Ok(self.snapshot()?.into_scan(range))
    }

    pub fn stats(&self) -> Result<Stats> {
        let conn = self.readers.acquire()?;
        let (live, tombstones) = conn.query_row(
            "SELECT COALESCE(SUM(deleted = 0), 0), COALESCE(SUM(deleted = 1), 0) FROM entries",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(Stats {
            live: live.max(0) as u64,
            tombstones: tombstones.max(0) as u64,
        })
    }

    /// Physically remove tombstones. Returns how many were purged.
    pub fn compact(&self) -> Result<usize> {
        let purged = self
            .writer
            .lock()
            .execute("DELETE FROM entries WHERE deleted = 1", [])?;
        tracing::info!(purged, "Compacted store");
        Ok(purged)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            key BLOB PRIMARY KEY NOT NULL,
            value BLOB,
            deleted INTEGER NOT NULL DEFAULT 0
        ) WITHOUT ROWID;
        CREATE TABLE IF NOT EXISTS meta (
            name TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );
        "#,
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (name, value) VALUES ('format', ?1)",
        [FORMAT_VERSION],
    )?;
    let format: String =
        conn.query_row("SELECT value FROM meta WHERE name = 'format'", [], |row| row.get(0))?;
    if format != FORMAT_VERSION {
        return Err(Error::IncompatibleFormat {
            reason: format!("store format {format}, expected {FORMAT_VERSION}"),
        });
    }
    Ok(())
}
