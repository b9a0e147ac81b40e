//! Calendar-aware timestamps.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// An absolute instant with microsecond resolution.
///
/// The instant is stored as microseconds since the Unix epoch in UTC. The
/// optional display offset only records which offset the value was
/// originally expressed in; it never participates in key ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    micros: i64,
    offset: Option<FixedOffset>,
}

impl Timestamp {
    /// Earliest representable instant.
    pub const MIN: Timestamp = Timestamp {
        micros: i64::MIN,
        offset: None,
    };

    /// Latest representable instant.
    pub const MAX: Timestamp = Timestamp {
        micros: i64::MAX,
        offset: None,
    };

    /// A timestamp from raw epoch microseconds, without display offset.
    pub const fn from_micros(micros: i64) -> Self {
        Self {
            micros,
            offset: None,
        }
    }

    /// Normalize a zoned date-time, remembering its offset for display.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            micros: dt.timestamp_micros(),
            offset: Some(dt.offset().fix()),
        }
    }

    /// The current instant.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Parse an RFC 3339 string such as `2024-03-01T20:15:00+01:00`.
    pub fn parse_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| Self::from_datetime(&dt))
    }

    pub fn with_display_offset(mut self, offset: Option<FixedOffset>) -> Self {
        self.offset = offset;
        self
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }

    pub fn display_offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// The instant in UTC, if it fits chrono's calendar range.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.micros)
    }

    /// The instant expressed in its display offset (UTC when none).
    pub fn to_display(&self) -> Option<DateTime<FixedOffset>> {
        let offset = self.offset.unwrap_or_else(|| Utc.fix());
        self.to_utc().map(|dt| dt.with_timezone(&offset))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_micros(dt.timestamp_micros())
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.micros.cmp(&other.micros).then_with(|| {
            let lhs = self.offset.map(|o| o.local_minus_utc());
            let rhs = other.offset.map(|o| o.local_minus_utc());
            lhs.cmp(&rhs)
        })
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_display() {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => write!(f, "@{}us", self.micros),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
