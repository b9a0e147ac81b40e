//! Document to record conversion.

use std::collections::{HashMap, HashSet};

use codec::{EntityId, Field, FieldDef, FieldType, Record, Schema, UnknownFields, Value};
use serde_json::Value as Json;

use crate::batch::{Candidate, ImportBatch};
use crate::document::{self, lookup, root, type_name};
use crate::timestamp::TimestampParser;
use crate::{Error, ImportConfig, RejectReason, Rejection, Result, Validation};

/// Turns documents into validated records for one configured kind.
#[derive(Debug, Clone)]
pub struct Importer {
    config: ImportConfig,
    timestamps: TimestampParser,
}

/// Per-field plan derived from the config and one schema.
struct Slot<'a> {
    def: &'a FieldDef,
    path: &'a str,
    default: Option<Value>,
}

impl Importer {
    pub fn new(config: ImportConfig) -> Result<Self> {
        let timestamps =
            TimestampParser::new(config.timestamp_format.clone(), config.timezone.as_deref())?;
        Ok(Self { config, timestamps })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn kind(&self) -> &str {
        &self.config.kind
    }

    /// Parse a document and extract its entries.
    ///
    /// Fails as a whole when the document is oversized, not well-formed, or
    /// has no entry array at the configured path.
    pub fn parse(&self, document: &str) -> Result<ImportBatch> {
        let format = self.config.format;
        let malformed = |reason: String| Error::MalformedDocument { format, reason };

        if document.len() > self.config.max_document_bytes {
            return Err(malformed(format!(
                "document is {} bytes, limit is {}",
                document.len(),
                self.config.max_document_bytes
            )));
        }

        let mut notes = Vec::new();
        let mut tree = document::parse(document, format, &mut notes)?;
        let entries = take(&mut tree, &self.config.records)
            .ok_or_else(|| malformed(format!("no '{}' in document", self.config.records)))?;
        let entries = match entries {
            Json::Array(entries) => entries,
            other => {
                return Err(malformed(format!(
                    "'{}' is {}, expected an array",
                    self.config.records,
                    type_name(&other)
                )));
            }
        };

        let candidates: Vec<_> = entries
            .into_iter()
            .enumerate()
            .map(|(index, source)| Candidate { index, source })
            .collect();
        tracing::debug!(
            kind = %self.config.kind,
            candidates = candidates.len(),
            "Parsed document"
        );
        Ok(ImportBatch::new(self.config.kind.clone(), candidates, notes))
    }

    /// Validate every entry of `batch` against `schema`.
    ///
    /// Errors only for configuration problems; bad entries land in
    /// [`Validation::rejected`].
    pub fn validate(&self, batch: ImportBatch, schema: &Schema) -> Result<Validation> {
        if batch.kind() != schema.kind {
            return Err(Error::Config(format!(
                "batch of kind '{}' validated against schema '{}'",
                batch.kind(),
                schema.kind
            )));
        }
        let slots = self.slots(schema)?;

        let mut consumed: HashSet<&str> = slots.iter().map(|s| root(s.path)).collect();
        consumed.insert(root(&self.config.entity));
        consumed.insert(root(&self.config.timestamp));

        let mut validation = Validation::default();
        let mut seen: HashMap<(EntityId, i64), usize> = HashMap::new();

        for Candidate { index, source } in batch.into_candidates() {
            let outcome = self
                .admit(&source, schema, &slots, &consumed)
                .and_then(|record| {
                    let key = (record.entity_id.clone(), record.timestamp.micros());
                    match seen.get(&key) {
                        Some(&first) => Err(RejectReason::DuplicateKey {
                            entity_id: record.entity_id.to_string(),
                            timestamp: record.timestamp,
                            first,
                        }),
                        None => {
                            seen.insert(key, index);
                            Ok(record)
                        }
                    }
                });
            match outcome {
                Ok(record) => validation.accepted.push(record),
                Err(reason) => {
                    tracing::warn!(index, code = reason.code(), %reason, "Rejected entry");
                    validation.rejected.push(Rejection {
                        index,
                        candidate: source,
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            kind = %schema.kind,
            version = schema.version,
            accepted = validation.accepted.len(),
            rejected = validation.rejected.len(),
            "Validated batch"
        );
        Ok(validation)
    }

    fn slots<'a>(&'a self, schema: &'a Schema) -> Result<Vec<Slot<'a>>> {
        let unknown = |field: &str| Error::UnknownField {
            kind: schema.kind.clone(),
            field: field.to_string(),
        };
        if let Some(field) = self
            .config
            .fields
            .keys()
            .chain(self.config.defaults.keys())
            .find(|name| schema.by_name(name).is_none())
        {
            return Err(unknown(field));
        }

        schema
            .fields
            .iter()
            .map(|def| {
                let default = match self.config.defaults.get(&def.name) {
                    Some(value) => Some(value.clone().coerce(def.ty).ok_or_else(|| {
                        Error::Config(format!(
                            "default for '{}' is not a {}",
                            def.name, def.ty
                        ))
                    })?),
                    None => def.default.clone(),
                };
                let path = self
                    .config
                    .fields
                    .get(&def.name)
                    .map_or(def.name.as_str(), String::as_str);
                Ok(Slot { def, path, default })
            })
            .collect()
    }

    fn admit(
        &self,
        source: &Json,
        schema: &Schema,
        slots: &[Slot<'_>],
        consumed: &HashSet<&str>,
    ) -> std::result::Result<Record, RejectReason> {
        let entry = source.as_object().ok_or(RejectReason::NotAnObject)?;

        let entity = match lookup(source, &self.config.entity) {
            Some(Json::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Json::Number(n)) => n.to_string(),
            _ => {
                return Err(RejectReason::MissingEntityId {
                    path: self.config.entity.clone(),
                });
            }
        };
        if entity.len() > EntityId::MAX_LEN {
            return Err(RejectReason::InvalidEntityId {
                length: entity.len(),
                max: EntityId::MAX_LEN,
            });
        }

        let timestamp = match lookup(source, &self.config.timestamp) {
            None | Some(Json::Null) => {
                return Err(RejectReason::MissingTimestamp {
                    path: self.config.timestamp.clone(),
                });
            }
            Some(raw) => self
                .timestamps
                .parse(raw)
                .ok_or_else(|| RejectReason::InvalidTimestamp {
                    value: raw.to_string(),
                })?,
        };

        let mut record = Record::new(schema.kind.clone(), entity, timestamp, schema.version);

        for slot in slots {
            let def = slot.def;
            match lookup(source, slot.path).filter(|v| !v.is_null()) {
                Some(raw) => {
                    let value = self.convert(raw, def.ty).ok_or_else(|| {
                        RejectReason::TypeMismatch {
                            field: def.name.clone(),
                            expected: def.ty,
                            found: type_name(raw).to_string(),
                        }
                    })?;
                    record.payload.insert(Field::new(def.tag, def.name.clone(), value));
                }
                None => match &slot.default {
                    Some(value) => {
                        record
                            .payload
                            .insert(Field::new(def.tag, def.name.clone(), value.clone()));
                    }
                    None if def.required => {
                        return Err(RejectReason::MissingField {
                            field: def.name.clone(),
                        });
                    }
                    None => {}
                },
            }
        }

        if self.config.unknown_fields == UnknownFields::Preserve {
            for (key, raw) in entry {
                // Names of schema fields stay reserved even when unmapped.
                if raw.is_null() || consumed.contains(key.as_str()) || schema.by_name(key).is_some() {
                    continue;
                }
                record.payload.insert(Field::untagged(key.clone(), plain(raw)));
            }
        }

        Ok(record)
    }

    fn convert(&self, raw: &Json, ty: FieldType) -> Option<Value> {
        if ty == FieldType::Timestamp {
            return self.timestamps.parse(raw).map(Value::Timestamp);
        }
        scalar(raw)?.coerce(ty)
    }
}

/// Remove and return the node at a dotted path.
fn take(tree: &mut Json, path: &str) -> Option<Json> {
    if path.is_empty() {
        return Some(tree.take());
    }
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (parent, last),
        None => ("", path),
    };
    let mut node = tree;
    if !parent.is_empty() {
        for segment in parent.split('.') {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
    }
    node.as_object_mut()?.remove(last)
}

fn scalar(raw: &Json) -> Option<Value> {
    match raw {
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_u64().map(Value::Uint))
            .or_else(|| n.as_f64().map(Value::Float)),
        Json::String(s) => Some(Value::Text(s.clone())),
        Json::Null | Json::Array(_) | Json::Object(_) => None,
    }
}

/// Untyped rendition of an element kept outside the schema.
fn plain(raw: &Json) -> Value {
    scalar(raw).unwrap_or_else(|| Value::Text(raw.to_string()))
}
