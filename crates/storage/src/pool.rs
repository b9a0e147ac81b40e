//! Read-only connections shared by snapshots and point lookups.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use crate::Result;

pub(crate) struct ReaderPool {
    path: PathBuf,
    busy_timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    pub(crate) fn new(path: PathBuf, busy_timeout: Duration, max_idle: usize) -> Self {
        Self {
            path,
            busy_timeout,
            max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let conn = match self.idle.lock().pop() {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            reusable: true,
        })
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

/// A reader connection that returns to its pool when dropped.
pub(crate) struct PooledConnection {
    /// Only emptied by `drop`.
    conn: Option<Connection>,
    pool: Arc<ReaderPool>,
    reusable: bool,
}

impl PooledConnection {
    /// Close the connection on drop instead of returning it to the pool.
    pub(crate) fn discard(&mut self) {
        self.reusable = false;
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("pooled connection accessed during drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.reusable {
                self.pool.release(conn);
            }
        }
    }
}
