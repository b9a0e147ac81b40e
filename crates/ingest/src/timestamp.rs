//! Timestamp recognition for imported entries.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use codec::Timestamp;
use serde_json::Value as Json;

use crate::{Error, Result};

/// Naive forms tried when no format is configured.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Reads entry timestamps.
///
/// Values with an explicit offset keep it for display. Naive values are
/// placed in the configured zone. Integers are seconds since the Unix epoch.
#[derive(Debug, Clone)]
pub(crate) struct TimestampParser {
    format: Option<String>,
    zone: FixedOffset,
}

impl TimestampParser {
    pub(crate) fn new(format: Option<String>, timezone: Option<&str>) -> Result<Self> {
        let zone = match timezone.map(str::trim) {
            None | Some("") | Some("UTC") | Some("Z") => FixedOffset::east_opt(0),
            Some(tz) => tz.parse::<FixedOffset>().ok(),
        }
        .ok_or_else(|| {
            Error::Config(format!(
                "timezone '{}' is not UTC or an offset like +01:00",
                timezone.unwrap_or_default()
            ))
        })?;
        Ok(Self { format, zone })
    }

    pub(crate) fn parse(&self, value: &Json) -> Option<Timestamp> {
        match value {
            Json::String(s) => self.parse_str(s.trim()),
            Json::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(Timestamp::from),
            _ => None,
        }
    }

    fn parse_str(&self, s: &str) -> Option<Timestamp> {
        if let Some(format) = &self.format {
            if let Ok(dt) = DateTime::parse_from_str(s, format) {
                return Some(Timestamp::from_datetime(&dt));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return self.localize(naive);
            }
            return NaiveDate::parse_from_str(s, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .and_then(|naive| self.localize(naive));
        }

        if let Ok(ts) = Timestamp::parse_rfc3339(s) {
            return Some(ts);
        }
        if let Some(naive) = NAIVE_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        {
            return self.localize(naive);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .and_then(|naive| self.localize(naive))
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<Timestamp> {
        self.zone
            .from_local_datetime(&naive)
            .single()
            .map(|dt| Timestamp::from_datetime(&dt))
    }
}
