//! Configuration loading from tidemark.toml.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use codec::{Field, Payload, Schema, SchemaRegistry};
use eventstore::StoreConfig;
use ingest::ImportConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Store location and read behaviour.
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Every known schema version, in any order.
    #[serde(default)]
    pub schemas: Vec<Schema>,

    /// Import profiles by name.
    #[serde(default)]
    pub imports: BTreeMap<String, ImportConfig>,
}

/// Log output settings.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Log to this file instead of stderr.
    pub file: Option<PathBuf>,

    /// Start the file afresh on every run instead of appending.
    #[serde(default)]
    pub truncate: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            truncate: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build the schema registry from the configured schemas.
    ///
    /// Consecutive versions of a kind are bridged by an upgrade that fills
    /// the newer version's defaults into fields the record lacks. A version
    /// that adds a required field without a default cannot be bridged.
    pub fn registry(&self) -> Result<SchemaRegistry, ConfigError> {
        let mut schemas = self.schemas.clone();
        schemas.sort_by(|a, b| a.kind.cmp(&b.kind).then(a.version.cmp(&b.version)));

        let mut registry = SchemaRegistry::new();
        for (i, schema) in schemas.iter().enumerate() {
            registry.register(schema.clone())?;

            let Some(previous) = i.checked_sub(1).map(|j| &schemas[j]) else {
                continue;
            };
            if previous.kind != schema.kind {
                continue;
            }
            // Filling defaults cannot produce a newly required field.
            if let Some(def) = schema.fields.iter().find(|def| {
                def.required
                    && def.default.is_none()
                    && !previous.by_tag(def.tag).is_some_and(|old| old.required)
            }) {
                return Err(ConfigError::UnbridgeableSchema {
                    kind: schema.kind.clone(),
                    version: schema.version,
                    field: def.name.clone(),
                });
            }
            let defaults: Vec<Field> = registry
                .schema(&schema.kind, schema.version)
                .into_iter()
                .flat_map(|s| &s.fields)
                .filter_map(|def| Some(Field::new(def.tag, def.name.clone(), def.default.clone()?)))
                .collect();
            registry.register_upgrade(&previous.kind, previous.version, move |payload| {
                fill_defaults(payload, &defaults)
            })?;
        }
        Ok(registry)
    }
}

fn fill_defaults(mut payload: Payload, defaults: &[Field]) -> Payload {
    for field in defaults {
        if payload.field(&field.name).is_none() {
            payload.insert(field.clone());
        }
    }
    payload
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid schema config: {0}")]
    Schema(#[from] codec::Error),

    #[error("'{kind}' v{version} adds required field '{field}' without a default")]
    UnbridgeableSchema {
        kind: String,
        version: u32,
        field: String,
    },
}
