//! Typed field values.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Timestamp;

/// Type tag of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Uint,
    Float,
    Text,
    Bytes,
    Timestamp,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Uint => "uint",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::Bytes => "bytes",
            FieldType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed field value.
///
/// Floats compare by bit pattern, so `NaN` equals itself and `0.0` differs
/// from `-0.0`. Equality matches what survives an encode/decode cycle.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(Timestamp),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

/// Largest integer magnitude an f64 represents exactly.
const F64_EXACT: u64 = 1 << 53;

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Bool,
            Value::Int(_) => FieldType::Int,
            Value::Uint(_) => FieldType::Uint,
            Value::Float(_) => FieldType::Float,
            Value::Text(_) => FieldType::Text,
            Value::Bytes(_) => FieldType::Bytes,
            Value::Timestamp(_) => FieldType::Timestamp,
        }
    }

    /// Convert to `ty` when the conversion loses nothing.
    ///
    /// Integers move between signed, unsigned and float while in range,
    /// text becomes bytes or (if it is RFC 3339) a timestamp.
    pub fn coerce(self, ty: FieldType) -> Option<Value> {
        if self.field_type() == ty {
            return Some(self);
        }
        match (self, ty) {
            (Value::Int(n), FieldType::Uint) => u64::try_from(n).ok().map(Value::Uint),
            (Value::Uint(n), FieldType::Int) => i64::try_from(n).ok().map(Value::Int),
            (Value::Int(n), FieldType::Float) if n.unsigned_abs() <= F64_EXACT => {
                Some(Value::Float(n as f64))
            }
            (Value::Uint(n), FieldType::Float) if n <= F64_EXACT => Some(Value::Float(n as f64)),
            (Value::Float(x), FieldType::Int) if x.fract() == 0.0 && x.abs() <= F64_EXACT as f64 => {
                Some(Value::Int(x as i64))
            }
            (Value::Float(x), FieldType::Uint)
                if x.fract() == 0.0 && x >= 0.0 && x <= F64_EXACT as f64 =>
            {
                Some(Value::Uint(x as u64))
            }
            (Value::Text(s), FieldType::Bytes) => Some(Value::Bytes(s.into_bytes())),
            (Value::Text(s), FieldType::Timestamp) => {
                Timestamp::parse_rfc3339(&s).ok().map(Value::Timestamp)
            }
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Uint(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_bytes(v),
            Value::Timestamp(v) => v.serialize(serializer),
        }
    }
}

/// Shape of values written by hand in configuration files.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlainValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PlainValue::deserialize(deserializer)? {
            PlainValue::Bool(v) => Value::Bool(v),
            PlainValue::Int(v) => Value::Int(v),
            PlainValue::Uint(v) => Value::Uint(v),
            PlainValue::Float(v) => Value::Float(v),
            PlainValue::Text(v) => Value::Text(v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(Value::Int(7).coerce(FieldType::Uint), Some(Value::Uint(7)));
        assert_eq!(Value::Int(-7).coerce(FieldType::Uint), None);
        assert_eq!(Value::Uint(u64::MAX).coerce(FieldType::Int), None);
        assert_eq!(Value::Int(3).coerce(FieldType::Float), Some(Value::Float(3.0)));
        assert_eq!(Value::Float(4.0).coerce(FieldType::Int), Some(Value::Int(4)));
        assert_eq!(Value::Float(4.5).coerce(FieldType::Int), None);
    }

    #[test]
    fn test_coerce_text() {
        let ts = Value::from("2024-01-02T03:04:05Z").coerce(FieldType::Timestamp);
        assert!(matches!(ts, Some(Value::Timestamp(_))));
        assert_eq!(Value::from("nope").coerce(FieldType::Timestamp), None);
        assert_eq!(
            Value::from("ab").coerce(FieldType::Bytes),
            Some(Value::Bytes(b"ab".to_vec()))
        );
        assert_eq!(Value::from("1").coerce(FieldType::Int), None);
    }

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Float(1.0), Value::Int(1));
    }
}
