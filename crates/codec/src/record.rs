//! Record types.

use std::fmt;

use serde::Serialize;

use crate::{Timestamp, Value};

/// Stable identifier grouping a time series of records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Longest id, in bytes, that a storage key can hold.
    pub const MAX_LEN: usize = u16::MAX as usize;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A named, tagged value inside a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub tag: u32,
    pub name: String,
    pub value: Value,
}

impl Field {
    /// Tag carried by fields that have no slot in any schema.
    pub const UNTAGGED: u32 = 0;

    pub fn new(tag: u32, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            tag,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn untagged(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(Self::UNTAGGED, name, value)
    }
}

/// Ordered set of fields, sorted by `(tag, name)` with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: Vec<Field>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, returning the previous field with the same name.
    pub fn insert(&mut self, field: Field) -> Option<Field> {
        let previous = self.remove(&field.name);
        let at = self
            .fields
            .partition_point(|f| (f.tag, f.name.as_str()) < (field.tag, field.name.as_str()));
        self.fields.insert(at, field);
        previous
    }

    pub fn with(mut self, tag: u32, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(Field::new(tag, name, value));
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let at = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(at))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.field(name).map(|f| &f.value)
    }

    pub fn by_tag(&self, tag: u32) -> Option<&Field> {
        if tag == Field::UNTAGGED {
            return None;
        }
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn retain(&mut self, keep: impl FnMut(&Field) -> bool) {
        self.fields.retain(keep);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Field> for Payload {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for field in iter {
            payload.insert(field);
        }
        payload
    }
}

impl IntoIterator for Payload {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Payload {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// One schema-versioned, timestamped domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Logical record type; selects the schema lineage.
    pub kind: String,
    pub entity_id: EntityId,
    pub timestamp: Timestamp,
    pub schema_version: u32,
    pub payload: Payload,
}

impl Record {
    pub fn new(
        kind: impl Into<String>,
        entity_id: impl Into<EntityId>,
        timestamp: Timestamp,
        schema_version: u32,
    ) -> Self {
        Self {
            kind: kind.into(),
            entity_id: entity_id.into(),
            timestamp,
            schema_version,
            payload: Payload::new(),
        }
    }

    pub fn with_field(mut self, tag: u32, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(Field::new(tag, name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_stays_sorted_and_unique() {
        let mut payload = Payload::new()
            .with(3, "rating", 4_i64)
            .with(1, "title", "Heat")
            .with(Field::UNTAGGED, "note", "extra");

        let order: Vec<_> = payload.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, ["note", "title", "rating"]);

        let previous = payload.insert(Field::new(1, "title", "Ronin"));
        assert_eq!(previous.unwrap().value, Value::from("Heat"));
        assert_eq!(payload.len(), 3);
        assert_eq!(payload.get("title"), Some(&Value::from("Ronin")));
        assert!(payload.by_tag(Field::UNTAGGED).is_none());
    }
}
