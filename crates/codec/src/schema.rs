//! Schema definitions and payload checks.

use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

use crate::{Error, Field, FieldType, Payload, Result, Value};

/// One field slot in a schema.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDef {
    pub tag: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Value used when an import leaves an optional field absent.
    #[serde(default)]
    pub default: Option<Value>,
}

/// Field layout of one version of a record kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Schema {
    pub kind: String,
    pub version: u32,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// Why a payload does not fit a schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaViolation {
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' expects {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: FieldType,
    },

    #[error("field '{field}' carries tag {found}, schema assigns tag {expected}")]
    TagConflict {
        field: String,
        expected: u32,
        found: u32,
    },
}

impl SchemaViolation {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaViolation::MissingField { .. } => "missing_field",
            SchemaViolation::TypeMismatch { .. } => "type_mismatch",
            SchemaViolation::TagConflict { .. } => "tag_conflict",
        }
    }
}

impl Schema {
    pub fn new(kind: impl Into<String>, version: u32) -> Self {
        Self {
            kind: kind.into(),
            version,
            fields: Vec::new(),
        }
    }

    /// Add an optional field.
    pub fn field(mut self, tag: u32, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            tag,
            name: name.into(),
            ty,
            required: false,
            default: None,
        });
        self
    }

    /// Add a required field.
    pub fn required(mut self, tag: u32, name: impl Into<String>, ty: FieldType) -> Self {
        self = self.field(tag, name, ty);
        if let Some(def) = self.fields.last_mut() {
            def.required = true;
        }
        self
    }

    /// Set the default of the most recently added field.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        if let Some(def) = self.fields.last_mut() {
            def.default = Some(value.into());
        }
        self
    }

    pub fn by_tag(&self, tag: u32) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the field occupies a slot of this schema.
    pub fn knows(&self, field: &Field) -> bool {
        field.tag != Field::UNTAGGED
            && self
                .by_tag(field.tag)
                .is_some_and(|def| def.name == field.name)
    }

    /// Check a payload against this schema.
    ///
    /// Fields without a slot are accepted; they are the caller's business.
    pub fn check(&self, payload: &Payload) -> std::result::Result<(), SchemaViolation> {
        for field in payload {
            let Some(def) = self.by_name(&field.name) else {
                // A slot's tag reused under another name.
                if self.by_tag(field.tag).is_some() {
                    return Err(SchemaViolation::TagConflict {
                        field: field.name.clone(),
                        expected: Field::UNTAGGED,
                        found: field.tag,
                    });
                }
                continue;
            };
            if def.tag != field.tag {
                return Err(SchemaViolation::TagConflict {
                    field: field.name.clone(),
                    expected: def.tag,
                    found: field.tag,
                });
            }
            if def.ty != field.value.field_type() {
                return Err(SchemaViolation::TypeMismatch {
                    field: field.name.clone(),
                    expected: def.ty,
                    found: field.value.field_type(),
                });
            }
        }
        for def in self.fields.iter().filter(|d| d.required) {
            if payload.get(&def.name).is_none() {
                return Err(SchemaViolation::MissingField {
                    field: def.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validate the definition and coerce defaults to their field types.
    pub(crate) fn normalized(mut self) -> Result<Self> {
        if self.kind.is_empty() {
            return Err(self.invalid("kind must not be empty"));
        }
        if self.version == 0 {
            return Err(self.invalid("versions start at 1"));
        }
        let mut tags = HashSet::new();
        let mut names = HashSet::new();
        for def in &self.fields {
            if def.tag == Field::UNTAGGED {
                return Err(self.invalid(format!("field '{}' uses reserved tag 0", def.name)));
            }
            if !tags.insert(def.tag) {
                return Err(self.invalid(format!("tag {} is used twice", def.tag)));
            }
            if def.name.is_empty() || !names.insert(def.name.as_str()) {
                return Err(self.invalid(format!("field name '{}' is empty or repeated", def.name)));
            }
        }
        let mut fields = std::mem::take(&mut self.fields);
        for def in &mut fields {
            if let Some(default) = def.default.take() {
                let found = default.field_type();
                match default.coerce(def.ty) {
                    Some(value) => def.default = Some(value),
                    None => {
                        return Err(self.invalid(format!(
                            "default of '{}' is {found}, field is {}",
                            def.name, def.ty
                        )));
                    }
                }
            }
        }
        self.fields = fields;
        Ok(self)
    }

    /// Check that this schema only appends to `older`.
    pub(crate) fn check_extends(&self, older: &Schema) -> Result<()> {
        for old in &older.fields {
            if let Some(def) = self.by_tag(old.tag) {
                if def.name != old.name || def.ty != old.ty {
                    return Err(self.invalid(format!(
                        "tag {} was '{}' ({}) in v{}",
                        old.tag, old.name, old.ty, older.version
                    )));
                }
            }
            if let Some(def) = self.by_name(&old.name) {
                if def.tag != old.tag {
                    return Err(self.invalid(format!(
                        "field '{}' was tag {} in v{}",
                        old.name, old.tag, older.version
                    )));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidSchema {
            kind: self.kind.clone(),
            version: self.version,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use crate::Timestamp;

    fn screening() -> Schema {
        Schema::new("screening", 1)
            .required(1, "title", FieldType::Text)
            .field(2, "minutes", FieldType::Uint)
    }

    #[test]
    fn test_check_accepts_valid_payload() {
        let record = Record::new("screening", "odeon", Timestamp::from_micros(0), 1)
            .with_field(1, "title", "Alien")
            .with_field(Field::UNTAGGED, "note", "35mm");
        assert_eq!(screening().check(&record.payload), Ok(()));
    }

    #[test]
    fn test_check_reports_violations() {
        let schema = screening();

        let missing = Payload::new().with(2, "minutes", 117_u64);
        assert_eq!(
            schema.check(&missing).unwrap_err().code(),
            "missing_field"
        );

        let mistyped = Payload::new().with(1, "title", 5_i64);
        assert!(matches!(
            schema.check(&mistyped),
            Err(SchemaViolation::TypeMismatch { expected: FieldType::Text, .. })
        ));

        let wrong_tag = Payload::new().with(7, "title", "Alien");
        assert_eq!(schema.check(&wrong_tag).unwrap_err().code(), "tag_conflict");
    }

    #[test]
    fn test_normalize_coerces_defaults() {
        let schema = Schema::new("screening", 1)
            .field(1, "price", FieldType::Float)
            .default_value(9_i64)
            .normalized()
            .unwrap();
        assert_eq!(schema.fields[0].default, Some(Value::Float(9.0)));

        let bad = Schema::new("screening", 1)
            .field(1, "price", FieldType::Float)
            .default_value("free")
            .normalized();
        assert!(matches!(bad, Err(Error::InvalidSchema { .. })));
    }

    #[test]
    fn test_normalize_rejects_duplicate_tags() {
        let schema = Schema::new("screening", 1)
            .field(1, "a", FieldType::Int)
            .field(1, "b", FieldType::Int);
        assert!(schema.normalized().is_err());
        assert!(Schema::new("screening", 1).field(0, "a", FieldType::Int).normalized().is_err());
    }

    #[test]
    fn test_schema_from_toml() {
        let schema: Schema = toml::from_str(
            r#"
kind = "screening"
version = 2
fields = [
    { tag = 1, name = "title", type = "text", required = true },
    { tag = 2, name = "language", type = "text", default = "en" },
]
"#,
        )
        .unwrap();
        assert_eq!(schema.version, 2);
        assert!(schema.fields[0].required);
        assert_eq!(schema.fields[1].default, Some(Value::from("en")));
    }
}
