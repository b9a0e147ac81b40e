//! Exclusive ownership of a store directory.
//!
//! The lock is a tiny SQLite database held in exclusive locking mode, so
//! it is released by the OS when the owning process dies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::{Error, Result};

const LOCK_FILE: &str = "LOCK";

pub(crate) struct StoreLock {
    // Never touched again; the mutex only makes the handle `Sync`.
    _conn: Mutex<Connection>,
}

impl StoreLock {
    pub(crate) fn acquire(dir: &Path) -> Result<Self> {
        let locked = || Error::Locked {
            path: PathBuf::from(dir),
        };

        let conn = Connection::open(dir.join(LOCK_FILE))?;
        conn.busy_timeout(Duration::ZERO)?;
        conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| {
            row.get::<_, String>(0)
        })?;

        match conn.execute_batch("BEGIN EXCLUSIVE") {
            Ok(()) => {}
            Err(e) if Error::is_busy(&e) => return Err(locked()),
            Err(e) => return Err(e.into()),
        }
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS holder (pid INTEGER NOT NULL); DELETE FROM holder;",
        )?;
        conn.execute("INSERT INTO holder (pid) VALUES (?1)", [std::process::id()])?;
        // Exclusive locking mode keeps the lock after commit.
        conn.execute_batch("COMMIT")?;

        Ok(Self {
            _conn: Mutex::new(conn),
        })
    }
}
