//! Point-in-time read views and lazy range scans.

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::iter::FusedIterator;

use rusqlite::{OptionalExtension, Row, params};

use crate::pool::PooledConnection;
use crate::{KeyRange, Result};

/// A stored key with its value.
pub type Entry = (Vec<u8>, Vec<u8>);

const PAGE_BOUNDED: &str = "SELECT key, value FROM entries \
     WHERE key >= ?1 AND key < ?2 AND deleted = 0 ORDER BY key LIMIT ?3";
const PAGE_UNBOUNDED: &str = "SELECT key, value FROM entries \
     WHERE key >= ?1 AND deleted = 0 ORDER BY key LIMIT ?2";

/// A read transaction pinned at the moment it was taken.
///
/// Writes committed afterwards are invisible to it; everything committed
/// before it is visible. The transaction ends when the snapshot is dropped.
pub struct Snapshot {
    conn: PooledConnection,
    page_size: usize,
}

impl Snapshot {
    pub(crate) fn begin(conn: PooledConnection, page_size: usize) -> Result<Self> {
        conn.execute_batch("BEGIN DEFERRED")?;
        let snapshot = Self {
            conn,
            page_size: page_size.max(1),
        };
        // The first read fixes the view.
        snapshot
            .conn
            .query_row("SELECT COUNT(*) FROM meta", [], |row| row.get::<_, i64>(0))?;
        Ok(snapshot)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .prepare_cached("SELECT value FROM entries WHERE key = ?1 AND deleted = 0")?
            .query_row([key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Lazily scan `range` in ascending key order.
    pub fn scan(&self, range: KeyRange) -> Scan<&Snapshot> {
        Scan::new(self, range)
    }

    /// Like [`scan`](Self::scan), but the scan owns the snapshot.
    pub fn into_scan(self, range: KeyRange) -> Scan<Snapshot> {
        Scan::new(self, range)
    }

    fn page(&self, range: &KeyRange) -> Result<Vec<Entry>> {
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let entries = match range.end() {
            Some(end) => self
                .conn
                .prepare_cached(PAGE_BOUNDED)?
                .query_map(params![range.start(), end, limit], entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => self
                .conn
                .prepare_cached(PAGE_UNBOUNDED)?
                .query_map(params![range.start(), limit], entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(entries)
    }
}

fn entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok((row.get(0)?, row.get(1)?))
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "Failed to end snapshot, discarding connection");
            self.conn.discard();
        }
    }
}

/// Lazy, finite, key-ascending sequence of entries read through a snapshot.
///
/// Entries are fetched a page at a time. [`remaining`](Scan::remaining)
/// gives the range still to visit, so a scan can be restarted from where
/// it stopped on another snapshot.
pub struct Scan<S> {
    snapshot: S,
    range: KeyRange,
    next_page: KeyRange,
    buffer: VecDeque<Entry>,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl<S: Borrow<Snapshot>> Scan<S> {
    fn new(snapshot: S, range: KeyRange) -> Self {
        let done = range.is_empty();
        Self {
            snapshot,
            next_page: range.clone(),
            range,
            buffer: VecDeque::new(),
            last_key: None,
            done,
        }
    }

    /// The part of the scanned range not yet yielded.
    pub fn remaining(&self) -> KeyRange {
        match &self.last_key {
            Some(key) => self.range.after(key),
            None => self.range.clone(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.snapshot.borrow()
    }

    fn fill(&mut self) -> Result<()> {
        let snapshot = self.snapshot.borrow();
        let page = snapshot.page(&self.next_page)?;
        if page.len() < snapshot.page_size {
            self.done = true;
        }
        if let Some((key, _)) = page.last() {
            self.next_page = self.next_page.after(key);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<S: Borrow<Snapshot>> Iterator for Scan<S> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        let (key, value) = self.buffer.pop_front()?;
        self.last_key = Some(key.clone());
        Some(Ok((key, value)))
    }
}

impl<S: Borrow<Snapshot>> FusedIterator for Scan<S> {}
