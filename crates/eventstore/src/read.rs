//! Decoding reads over storage scans.

use std::borrow::Borrow;
use std::iter::FusedIterator;
use std::sync::Arc;

use codec::{Record, RecordCodec};
use storage::{Scan, Snapshot};

use crate::{DecodePolicy, Error, RecordKey, Result};

/// Lazy, time-ascending records of one entity.
///
/// Every record is upgraded to the latest schema version of its kind.
/// Entries that cannot be decoded are handled by the store's
/// [`DecodePolicy`].
pub struct Records<S> {
    scan: Scan<S>,
    codec: Arc<RecordCodec>,
    policy: DecodePolicy,
    skipped: usize,
    done: bool,
}

impl<S: Borrow<Snapshot>> Records<S> {
    pub(crate) fn new(scan: Scan<S>, codec: Arc<RecordCodec>, policy: DecodePolicy) -> Self {
        Self {
            scan,
            codec,
            policy,
            skipped: 0,
            done: false,
        }
    }

    /// Entries stepped over so far under [`DecodePolicy::Skip`].
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

pub(crate) fn decode_entry(codec: &RecordCodec, key: &[u8], value: &[u8]) -> Result<Record> {
    let stored = RecordKey::decode(key)?;
    let record = codec.decode_any(value)?;
    if RecordKey::of(&record) != stored {
        return Err(Error::InvalidKey(format!(
            "record for '{}' at {} is stored under '{}' at {}us",
            record.entity_id,
            record.timestamp,
            stored.entity_id(),
            stored.micros()
        )));
    }
    Ok(codec.registry().upgrade(record)?)
}

impl<S: Borrow<Snapshot>> Iterator for Records<S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let (key, value) = match self.scan.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            match decode_entry(&self.codec, &key, &value) {
                Ok(record) => return Some(Ok(record)),
                Err(e) if self.policy == DecodePolicy::Skip && e.is_skippable() => {
                    self.skipped += 1;
                    tracing::warn!(error = %e, key_len = key.len(), "Skipping undecodable entry");
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl<S: Borrow<Snapshot>> FusedIterator for Records<S> {}
