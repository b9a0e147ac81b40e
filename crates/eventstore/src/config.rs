//! Event store configuration.

use std::path::{Path, PathBuf};

use codec::UnknownFields;
use serde::Deserialize;

use crate::{Error, Result};

/// What a read does with an entry it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Count the entry, log a warning and continue.
    #[default]
    Skip,
    /// Yield the error and end the sequence.
    Strict,
}

/// Store location and read behaviour, usually the `[store]` table of the
/// CLI configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store directory; created on first open.
    pub path: PathBuf,

    #[serde(default)]
    pub decode: DecodePolicy,

    /// Whether decoded records keep untagged fields.
    #[serde(default)]
    pub unknown_fields: UnknownFields,

    #[serde(flatten)]
    pub storage: storage::Options,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            decode: DecodePolicy::default(),
            unknown_fields: UnknownFields::default(),
            storage: storage::Options::default(),
        }
    }

    pub fn with_decode(mut self, decode: DecodePolicy) -> Self {
        self.decode = decode;
        self
    }

    pub fn with_unknown_fields(mut self, unknown_fields: UnknownFields) -> Self {
        self.unknown_fields = unknown_fields;
        self
    }

    /// Load a store configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a store configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_config() {
        let config = StoreConfig::parse(
            r#"
path = "/var/lib/tidemark"
decode = "strict"
unknown_fields = "drop"
page_size = 64
"#,
        )
        .unwrap();

        assert_eq!(config.path, PathBuf::from("/var/lib/tidemark"));
        assert_eq!(config.decode, DecodePolicy::Strict);
        assert_eq!(config.unknown_fields, UnknownFields::Drop);
        assert_eq!(config.storage.page_size, 64);
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::parse(r#"path = "data""#).unwrap();
        assert_eq!(config.decode, DecodePolicy::Skip);
        assert_eq!(config.unknown_fields, UnknownFields::Preserve);
        assert_eq!(config.storage.page_size, 256);
    }

    #[test]
    fn test_missing_path() {
        assert!(matches!(
            StoreConfig::parse("decode = \"skip\""),
            Err(Error::Config(_))
        ));
    }
}
