//! Record encoding and schema-aware decoding.

use std::sync::Arc;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::wire::{self, FieldFrame, RecordFrame, TimestampFrame, ValueFrame};
use crate::{EntityId, Error, Field, Payload, Record, Result, SchemaRegistry, Timestamp, Value};

/// What to do with fields that have no slot in the record's schema version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFields {
    /// Keep them in the payload untouched.
    #[default]
    Preserve,
    /// Remove them while decoding.
    Drop,
}

/// Encode a record into a self-describing frame.
///
/// Fails with [`Error::RecordTooLarge`] if the record could not be decoded
/// again.
pub fn encode(record: &Record) -> Result<Vec<u8>> {
    let frame = RecordFrame {
        kind: record.kind.clone(),
        schema_version: record.schema_version,
        entity_id: record.entity_id.as_str().to_string(),
        timestamp: Some(timestamp_frame(&record.timestamp)),
        fields: record
            .payload
            .iter()
            .map(|field| FieldFrame {
                tag: field.tag,
                name: field.name.clone(),
                value: Some(value_frame(&field.value)),
            })
            .collect(),
    };
    wire::seal(&frame)
}

/// Decode a frame without consulting any schema.
pub fn decode_raw(bytes: &[u8]) -> Result<Record> {
    let frame = wire::open(bytes)?;
    let timestamp = frame
        .timestamp
        .ok_or_else(|| Error::corrupt("record has no timestamp"))
        .and_then(timestamp_from_frame)?;

    let mut payload = Payload::new();
    for field in frame.fields {
        let value = field
            .value
            .ok_or_else(|| Error::corrupt(format!("field '{}' has no value", field.name)))
            .and_then(value_from_frame)?;
        if payload
            .insert(Field {
                tag: field.tag,
                name: field.name,
                value,
            })
            .is_some()
        {
            return Err(Error::corrupt("field name repeated"));
        }
    }

    Ok(Record {
        kind: frame.kind,
        entity_id: EntityId::new(frame.entity_id),
        timestamp,
        schema_version: frame.schema_version,
        payload,
    })
}

fn timestamp_frame(ts: &Timestamp) -> TimestampFrame {
    TimestampFrame {
        micros: ts.micros(),
        offset_seconds: ts.display_offset().map(|o| o.local_minus_utc()),
    }
}

fn timestamp_from_frame(frame: TimestampFrame) -> Result<Timestamp> {
    let offset = match frame.offset_seconds {
        Some(secs) => Some(
            FixedOffset::east_opt(secs)
                .ok_or_else(|| Error::corrupt(format!("invalid offset: {secs}s")))?,
        ),
        None => None,
    };
    Ok(Timestamp::from_micros(frame.micros).with_display_offset(offset))
}

fn value_frame(value: &Value) -> ValueFrame {
    match value {
        Value::Bool(v) => ValueFrame::Bool(*v),
        Value::Int(v) => ValueFrame::Int(*v),
        Value::Uint(v) => ValueFrame::Uint(*v),
        Value::Float(v) => ValueFrame::Float(*v),
        Value::Text(v) => ValueFrame::Text(v.clone()),
        Value::Bytes(v) => ValueFrame::Bytes(v.clone()),
        Value::Timestamp(v) => ValueFrame::Timestamp(timestamp_frame(v)),
    }
}

fn value_from_frame(frame: ValueFrame) -> Result<Value> {
    Ok(match frame {
        ValueFrame::Bool(v) => Value::Bool(v),
        ValueFrame::Int(v) => Value::Int(v),
        ValueFrame::Uint(v) => Value::Uint(v),
        ValueFrame::Float(v) => Value::Float(v),
        ValueFrame::Text(v) => Value::Text(v),
        ValueFrame::Bytes(v) => Value::Bytes(v),
        ValueFrame::Timestamp(v) => Value::Timestamp(timestamp_from_frame(v)?),
    })
}

/// Encoder/decoder bound to the schemas this process knows.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    registry: Arc<SchemaRegistry>,
    unknown_fields: UnknownFields,
}

impl RecordCodec {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            unknown_fields: UnknownFields::default(),
        }
    }

    pub fn with_unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown_fields = policy;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        encode(record)
    }

    /// Decode a record that must be of `expected_kind`.
    ///
    /// The record is returned at the version it was stored under; use
    /// [`SchemaRegistry::upgrade`] to bring it to the latest one.
    pub fn decode(&self, bytes: &[u8], expected_kind: &str) -> Result<Record> {
        let record = decode_raw(bytes)?;
        if record.kind != expected_kind {
            return Err(Error::KindMismatch {
                expected: expected_kind.to_string(),
                found: record.kind,
            });
        }
        self.admit(record)
    }

    /// Decode a record of any registered kind.
    pub fn decode_any(&self, bytes: &[u8]) -> Result<Record> {
        self.admit(decode_raw(bytes)?)
    }

    fn admit(&self, mut record: Record) -> Result<Record> {
        let schema = self.registry.resolve(&record.kind, record.schema_version)?;
        if self.unknown_fields == UnknownFields::Drop {
            record.payload.retain(|field| schema.knows(field));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldType, Schema};

    fn codec() -> RecordCodec {
        let registry = SchemaRegistry::new()
            .with_schema(
                Schema::new("screening", 1)
                    .required(1, "title", FieldType::Text)
                    .field(2, "minutes", FieldType::Uint),
            )
            .unwrap();
        RecordCodec::new(Arc::new(registry))
    }

    fn sample() -> Record {
        Record::new(
            "screening",
            "odeon",
            Timestamp::parse_rfc3339("2024-03-01T20:15:00.123456+01:00").unwrap(),
            1,
        )
        .with_field(1, "title", "Alien")
        .with_field(2, "minutes", 117_u64)
        .with_field(Field::UNTAGGED, "print", "35mm")
    }

    #[test]
    fn test_round_trip_every_value_type() {
        let record = sample()
            .with_field(10, "flag", true)
            .with_field(11, "delta", -42_i64)
            .with_field(12, "ratio", 0.25)
            .with_field(13, "blob", Value::Bytes(vec![0, 255, 7]))
            .with_field(14, "opened", Timestamp::from_micros(-1_000_000));

        assert_eq!(decode_raw(&encode(&record).unwrap()).unwrap(), record);
    }

    #[test]
    fn test_nan_round_trips_equal() {
        let record = sample().with_field(12, "ratio", f64::NAN);
        assert_eq!(decode_raw(&encode(&record).unwrap()).unwrap(), record);
    }

    #[test]
    fn test_decode_checks_kind() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(codec().decode(&bytes, "screening").unwrap(), sample());
        assert!(matches!(
            codec().decode(&bytes, "ticket"),
            Err(Error::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_newer_schema() {
        let mut record = sample();
        record.schema_version = 2;
        let err = codec().decode_any(&encode(&record).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedSchema { version: 2, latest: 1, .. }
        ));
        assert!(err.is_decode_failure());
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let mut record = sample();
        record.kind = "ticket".to_string();
        assert!(matches!(
            codec().decode_any(&encode(&record).unwrap()),
            Err(Error::UnknownKind(_))
        ));
    }

    #[test]
    fn test_unknown_fields_policy() {
        let bytes = encode(&sample().with_field(9, "aspect", "1.85")).unwrap();

        let kept = codec().decode_any(&bytes).unwrap();
        assert!(kept.get("print").is_some());
        assert!(kept.get("aspect").is_some());

        let dropped = codec()
            .with_unknown_fields(UnknownFields::Drop)
            .decode_any(&bytes)
            .unwrap();
        assert!(dropped.get("print").is_none());
        assert!(dropped.get("aspect").is_none());
        assert_eq!(dropped.payload.len(), 2);
    }

    #[test]
    fn test_truncated_bytes_are_corrupt() {
        let bytes = encode(&sample()).unwrap();
        let err = codec().decode_any(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { .. }));
    }
}
