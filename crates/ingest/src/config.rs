//! Import configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use codec::{UnknownFields, Value};
use serde::Deserialize;

use crate::{Error, Result};

/// Text format of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Toml => "toml",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How entries of a document map onto records of one kind.
///
/// Paths are dotted (`details.minutes`) and resolved inside each entry,
/// except `records`, which is resolved from the document root.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Record kind produced by this import.
    pub kind: String,

    #[serde(default = "default_format")]
    pub format: DocumentFormat,

    /// Path of the array holding the entries.
    #[serde(default = "default_records")]
    pub records: String,

    /// Path of the entity id inside an entry.
    #[serde(default = "default_entity")]
    pub entity: String,

    /// Path of the timestamp inside an entry.
    #[serde(default = "default_timestamp")]
    pub timestamp: String,

    /// strftime format for timestamps; RFC 3339 and ISO forms are tried
    /// when unset.
    #[serde(default)]
    pub timestamp_format: Option<String>,

    /// Offset applied to timestamps that carry none, e.g. `+01:00`.
    #[serde(default)]
    pub timezone: Option<String>,

    /// Schema field name to entry path. Unlisted fields use their own name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Values for absent optional fields; take precedence over schema
    /// defaults.
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,

    /// Whether entry elements mapped to no field are kept as untagged
    /// fields or dropped.
    #[serde(default)]
    pub unknown_fields: UnknownFields,

    /// Documents above this size are refused without parsing.
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

fn default_format() -> DocumentFormat {
    DocumentFormat::Json
}

fn default_records() -> String {
    "records".to_string()
}

fn default_entity() -> String {
    "entity".to_string()
}

fn default_timestamp() -> String {
    "timestamp".to_string()
}

fn default_max_document_bytes() -> usize {
    16 * 1024 * 1024
}

impl ImportConfig {
    /// A configuration with every default for `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            format: default_format(),
            records: default_records(),
            entity: default_entity(),
            timestamp: default_timestamp(),
            timestamp_format: None,
            timezone: None,
            fields: BTreeMap::new(),
            defaults: BTreeMap::new(),
            unknown_fields: UnknownFields::default(),
            max_document_bytes: default_max_document_bytes(),
        }
    }

    /// Load an import configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse an import configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = ImportConfig::parse(
            r#"
kind = "screening"
format = "toml"
records = "programme.screenings"
entity = "venue"
timestamp = "starts"
timezone = "+01:00"
unknown_fields = "drop"

[fields]
title = "film.title"

[defaults]
language = "en"
"#,
        )
        .unwrap();

        assert_eq!(config.format, DocumentFormat::Toml);
        assert_eq!(config.records, "programme.screenings");
        assert_eq!(config.fields["title"], "film.title");
        assert_eq!(config.defaults["language"], Value::from("en"));
        assert_eq!(config.unknown_fields, UnknownFields::Drop);
        assert_eq!(config.max_document_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_defaults() {
        let config = ImportConfig::parse(r#"kind = "screening""#).unwrap();
        assert_eq!(config.format, DocumentFormat::Json);
        assert_eq!(config.entity, "entity");
        assert_eq!(config.timestamp, "timestamp");
        assert_eq!(config.unknown_fields, UnknownFields::Preserve);
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(matches!(
            ImportConfig::parse("kind = \"x\"\nformat = \"yaml\""),
            Err(Error::Config(_))
        ));
    }
}
