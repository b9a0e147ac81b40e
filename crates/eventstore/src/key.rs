//! Storage key layout.
//!
//! `[entity length: u16 BE][entity bytes][micros: u64 BE, sign bit flipped]`
//!
//! The length prefix keeps one entity's keys contiguous and apart from any
//! other entity whose id it prefixes. Flipping the sign bit makes unsigned
//! byte order match signed time order, so a prefix scan is time-ascending.

use std::ops::{Bound, RangeBounds};

use codec::{EntityId, Record, Timestamp};
use storage::{KeyRange, prefix_successor};

use crate::{Error, Result};

const TIME_LEN: usize = 8;
const SIGN: u64 = 1 << 63;

/// The `(entity, instant)` identity of a stored record.
///
/// Display offsets are not part of the key: two timestamps naming the same
/// instant address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    entity_id: EntityId,
    micros: i64,
}

impl RecordKey {
    pub fn new(entity_id: EntityId, timestamp: &Timestamp) -> Self {
        Self {
            entity_id,
            micros: timestamp.micros(),
        }
    }

    pub fn of(record: &Record) -> Self {
        Self::new(record.entity_id.clone(), &record.timestamp)
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut key = entity_prefix(&self.entity_id)?;
        key.extend_from_slice(&time_bytes(self.micros));
        Ok(key)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let invalid = || Error::InvalidKey(format!("malformed stored key of {} bytes", bytes.len()));
        let (len, rest) = bytes.split_first_chunk::<2>().ok_or_else(invalid)?;
        let len = usize::from(u16::from_be_bytes(*len));
        if len == 0 || rest.len() != len + TIME_LEN {
            return Err(invalid());
        }
        let (entity, time) = rest.split_at(len);
        let entity = std::str::from_utf8(entity).map_err(|_| invalid())?;
        let time: [u8; TIME_LEN] = time.try_into().map_err(|_| invalid())?;
        Ok(Self {
            entity_id: EntityId::new(entity),
            micros: (u64::from_be_bytes(time) ^ SIGN) as i64,
        })
    }
}

/// Key prefix shared by every record of `entity`.
pub(crate) fn entity_prefix(entity: &EntityId) -> Result<Vec<u8>> {
    let bytes = entity.as_str().as_bytes();
    if bytes.is_empty() {
        return Err(Error::InvalidKey("entity id is empty".into()));
    }
    let len = u16::try_from(bytes.len()).map_err(|_| {
        Error::InvalidKey(format!(
            "entity id is {} bytes, limit is {}",
            bytes.len(),
            EntityId::MAX_LEN
        ))
    })?;
    let mut prefix = Vec::with_capacity(2 + bytes.len() + TIME_LEN);
    prefix.extend_from_slice(&len.to_be_bytes());
    prefix.extend_from_slice(bytes);
    Ok(prefix)
}

/// Keys of `entity` whose instant lies within `bounds`.
pub(crate) fn time_range(entity: &EntityId, bounds: &impl RangeBounds<Timestamp>) -> Result<KeyRange> {
    let prefix = entity_prefix(entity)?;
    let at = |micros: i64| {
        let mut key = prefix.clone();
        key.extend_from_slice(&time_bytes(micros));
        key
    };

    let start = match bounds.start_bound() {
        Bound::Included(t) => at(t.micros()),
        Bound::Excluded(t) => match t.micros().checked_add(1) {
            Some(micros) => at(micros),
            // Nothing lies after the last instant.
            None => return Ok(KeyRange::new(prefix.clone(), Some(prefix))),
        },
        Bound::Unbounded => prefix.clone(),
    };
    let end = match bounds.end_bound() {
        Bound::Included(t) => match t.micros().checked_add(1) {
            Some(micros) => Some(at(micros)),
            None => prefix_successor(&prefix),
        },
        Bound::Excluded(t) => Some(at(t.micros())),
        Bound::Unbounded => prefix_successor(&prefix),
    };
    Ok(KeyRange::new(start, end))
}

fn time_bytes(micros: i64) -> [u8; TIME_LEN] {
    ((micros as u64) ^ SIGN).to_be_bytes()
}
