//! Known schema versions and the upgrade path between them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::{Error, Payload, Record, Result, Schema};

/// Pure transformation of a payload from one schema version to the next.
pub type Upgrade = Arc<dyn Fn(Payload) -> Payload + Send + Sync>;

#[derive(Default)]
struct Lineage {
    versions: BTreeMap<u32, Schema>,
    /// Keyed by the version the upgrade starts from.
    upgrades: BTreeMap<u32, Upgrade>,
}

impl Lineage {
    fn latest(&self) -> Option<&Schema> {
        self.versions.values().next_back()
    }

    fn next_version(&self, after: u32) -> Option<u32> {
        self.versions.range(after + 1..).next().map(|(v, _)| *v)
    }
}

/// All schema versions known to this process, per record kind.
#[derive(Default)]
pub struct SchemaRegistry {
    kinds: HashMap<String, Lineage>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new schema version.
    ///
    /// Versions of a kind must be registered in increasing order and each
    /// one may only append to the tags and names of every earlier version.
    pub fn register(&mut self, schema: Schema) -> Result<()> {
        let schema = schema.normalized()?;
        let lineage = self.kinds.entry(schema.kind.clone()).or_default();

        if let Some(latest) = lineage.latest() {
            if schema.version <= latest.version {
                return Err(Error::InvalidSchema {
                    kind: schema.kind,
                    version: schema.version,
                    reason: format!("versions must increase (latest is v{})", latest.version),
                });
            }
        }
        for older in lineage.versions.values() {
            schema.check_extends(older)?;
        }

        tracing::debug!(kind = %schema.kind, version = schema.version, "Registered schema");
        lineage.versions.insert(schema.version, schema);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_schema(mut self, schema: Schema) -> Result<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Register the upgrade applied to records stored under `from_version`.
    ///
    /// The result is labelled with the next registered version of the kind.
    pub fn register_upgrade<F>(&mut self, kind: &str, from_version: u32, upgrade: F) -> Result<()>
    where
        F: Fn(Payload) -> Payload + Send + Sync + 'static,
    {
        let lineage = self
            .kinds
            .get_mut(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;
        if !lineage.versions.contains_key(&from_version) {
            return Err(Error::UnsupportedSchema {
                kind: kind.to_string(),
                version: from_version,
                latest: lineage.latest().map_or(0, |s| s.version),
            });
        }
        lineage.upgrades.insert(from_version, Arc::new(upgrade));
        Ok(())
    }

    pub fn schema(&self, kind: &str, version: u32) -> Option<&Schema> {
        self.kinds.get(kind)?.versions.get(&version)
    }

    pub fn latest(&self, kind: &str) -> Option<&Schema> {
        self.kinds.get(kind)?.latest()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// Resolve the schema a stored record was written under.
    pub fn resolve(&self, kind: &str, version: u32) -> Result<&Schema> {
        let lineage = self
            .kinds
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;
        lineage.versions.get(&version).ok_or_else(|| Error::UnsupportedSchema {
            kind: kind.to_string(),
            version,
            latest: lineage.latest().map_or(0, |s| s.version),
        })
    }

    /// Bring a record up to the latest version of its kind, applying one
    /// upgrade per version transition, oldest first.
    pub fn upgrade(&self, mut record: Record) -> Result<Record> {
        let lineage = self
            .kinds
            .get(&record.kind)
            .ok_or_else(|| Error::UnknownKind(record.kind.clone()))?;
        let latest = lineage.latest().map_or(0, |s| s.version);
        if record.schema_version > latest {
            return Err(Error::UnsupportedSchema {
                kind: record.kind,
                version: record.schema_version,
                latest,
            });
        }

        while record.schema_version < latest {
            let from = record.schema_version;
            let upgrade = lineage.upgrades.get(&from).ok_or_else(|| Error::MissingUpgrade {
                kind: record.kind.clone(),
                from,
            })?;
            let to = lineage.next_version(from).unwrap_or(latest);
            record.payload = upgrade(record.payload);
            record.schema_version = to;
            tracing::trace!(kind = %record.kind, from, to, "Upgraded record");
        }
        Ok(record)
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, lineage) in &self.kinds {
            let versions: Vec<_> = lineage.versions.keys().collect();
            map.entry(kind, &versions);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, FieldType, Timestamp, Value};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(Schema::new("screening", 1).required(1, "title", FieldType::Text))
            .unwrap();
        registry
            .register(
                Schema::new("screening", 2)
                    .required(1, "title", FieldType::Text)
                    .field(2, "language", FieldType::Text),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_versions_must_increase() {
        let mut registry = registry();
        let err = registry
            .register(Schema::new("screening", 2).required(1, "title", FieldType::Text))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { version: 2, .. }));
    }

    #[test]
    fn test_tags_are_never_repurposed() {
        let mut registry = registry();
        let renumbered = Schema::new("screening", 3).required(5, "title", FieldType::Text);
        assert!(registry.register(renumbered).is_err());

        let retyped = Schema::new("screening", 3).field(2, "language", FieldType::Int);
        assert!(registry.register(retyped).is_err());

        // Retiring a field is allowed, reusing its tag later is not.
        registry
            .register(Schema::new("screening", 3).required(1, "title", FieldType::Text))
            .unwrap();
        let reused = Schema::new("screening", 4).field(2, "subtitles", FieldType::Bool);
        assert!(registry.register(reused).is_err());
    }

    #[test]
    fn test_upgrade_applies_transition() {
        let mut registry = registry();
        registry
            .register_upgrade("screening", 1, |mut payload| {
                payload.insert(Field::new(2, "language", "en"));
                payload
            })
            .unwrap();

        let v1 = Record::new("screening", "odeon", Timestamp::from_micros(1), 1)
            .with_field(1, "title", "Alien");
        let upgraded = registry.upgrade(v1).unwrap();
        assert_eq!(upgraded.schema_version, 2);
        assert_eq!(upgraded.get("language"), Some(&Value::from("en")));
        assert_eq!(upgraded.get("title"), Some(&Value::from("Alien")));
    }

    #[test]
    fn test_upgrade_without_transition_fails() {
        let registry = registry();
        let v1 = Record::new("screening", "odeon", Timestamp::from_micros(1), 1);
        assert!(matches!(
            registry.upgrade(v1),
            Err(Error::MissingUpgrade { from: 1, .. })
        ));
    }

    #[test]
    fn test_upgrade_rejects_future_version() {
        let registry = registry();
        let v9 = Record::new("screening", "odeon", Timestamp::from_micros(1), 9);
        assert!(matches!(
            registry.upgrade(v9),
            Err(Error::UnsupportedSchema { version: 9, latest: 2, .. })
        ));
    }
}
