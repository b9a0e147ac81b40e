//! The event store.

use std::ops::RangeBounds;
use std::path::Path;
use std::sync::Arc;

use codec::{EntityId, Record, RecordCodec, SchemaRegistry, Timestamp};
use ingest::Importer;
use storage::{KeyRange, Snapshot, Stats, Storage, WriteBatch};
use uuid::Uuid;

use crate::key::{entity_prefix, time_range};
use crate::read::decode_entry;
use crate::{
    DecodePolicy, Error, ImportReport, RecordKey, Records, Result, StoreConfig, WriteFailure,
};

/// Durable, schema-checked, time-ordered records per entity.
///
/// `EventStore` is `Send + Sync`; share it through an `Arc`. Writes are
/// serialized by the storage layer, reads run on their own snapshots.
pub struct EventStore {
    storage: Storage,
    codec: Arc<RecordCodec>,
    decode: DecodePolicy,
}

impl EventStore {
    /// Open the store described by `config`, decoding with `registry`.
    pub fn open(config: &StoreConfig, registry: SchemaRegistry) -> Result<Self> {
        let storage = Storage::open_with(&config.path, config.storage.clone())?;
        let codec = RecordCodec::new(Arc::new(registry)).with_unknown_fields(config.unknown_fields);
        tracing::info!(
            path = %config.path.display(),
            kinds = ?codec.registry().kinds().collect::<Vec<_>>(),
            decode = ?config.decode,
            "Opened event store"
        );
        Ok(Self {
            storage,
            codec: Arc::new(codec),
            decode: config.decode,
        })
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        self.codec.registry()
    }

    /// Validate `record` against the schema of its version and persist it,
    /// replacing any record of the same entity at the same instant.
    pub fn write(&self, record: &Record) -> Result<()> {
        let schema = self
            .codec
            .registry()
            .resolve(&record.kind, record.schema_version)?;
        schema
            .check(&record.payload)
            .map_err(|violation| Error::Validation {
                kind: record.kind.clone(),
                version: record.schema_version,
                entity_id: record.entity_id.to_string(),
                timestamp: record.timestamp,
                violation,
            })?;

        let key = RecordKey::of(record).encode()?;
        let value = self.codec.encode(record)?;
        self.storage.put(&key, &value)?;
        tracing::debug!(
            kind = %record.kind,
            entity = %record.entity_id,
            timestamp = %record.timestamp,
            "Wrote record"
        );
        Ok(())
    }

    /// The record of `entity` at exactly `timestamp`, upgraded to the latest
    /// schema version.
    ///
    /// Decode failures are returned regardless of the decode policy.
    pub fn get(&self, entity: &EntityId, timestamp: &Timestamp) -> Result<Option<Record>> {
        let key = RecordKey::new(entity.clone(), timestamp).encode()?;
        self.storage
            .get(&key)?
            .map(|value| decode_entry(&self.codec, &key, &value))
            .transpose()
    }

    /// Remove the record of `entity` at `timestamp`, if any.
    pub fn delete(&self, entity: &EntityId, timestamp: &Timestamp) -> Result<()> {
        let key = RecordKey::new(entity.clone(), timestamp).encode()?;
        self.storage.delete(&key)?;
        tracing::debug!(%entity, %timestamp, "Deleted record");
        Ok(())
    }

    /// Remove every record of `entity` in one atomic batch.
    ///
    /// Records written concurrently with this call may survive it. Returns
    /// how many records were removed.
    pub fn delete_entity(&self, entity: &EntityId) -> Result<usize> {
        let range = KeyRange::prefix(&entity_prefix(entity)?);
        let mut batch = WriteBatch::new();
        for entry in self.storage.scan(range)? {
            let (key, _) = entry?;
            batch.delete(key);
        }
        self.storage.write(&batch)?;
        tracing::info!(%entity, removed = batch.len(), "Deleted entity");
        Ok(batch.len())
    }

    /// Records of `entity` within `range`, oldest first, read from a fresh
    /// snapshot.
    pub fn read(
        &self,
        entity: &EntityId,
        range: impl RangeBounds<Timestamp>,
    ) -> Result<Records<Snapshot>> {
        let keys = time_range(entity, &range)?;
        Ok(Records::new(
            self.storage.scan(keys)?,
            Arc::clone(&self.codec),
            self.decode,
        ))
    }

    /// The most recent record of `entity`.
    pub fn latest(&self, entity: &EntityId) -> Result<Option<Record>> {
        // Scans only ascend; the last record read wins.
        self.read(entity, ..)?.try_fold(None, |_, record| record.map(Some))
    }

    /// A consistent view for several reads.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            snapshot: self.storage.snapshot()?,
            codec: Arc::clone(&self.codec),
            decode: self.decode,
        })
    }

    pub fn stats(&self) -> Result<Stats> {
        Ok(self.storage.stats()?)
    }

    /// Purge tombstones left by deletes.
    pub fn compact(&self) -> Result<usize> {
        Ok(self.storage.compact()?)
    }

    /// Parse `document`, validate it against the latest schema of the
    /// importer's kind and write every accepted record.
    ///
    /// Fails only if the document cannot be parsed or the kind is unknown.
    /// Bad entries are listed in [`ImportReport::rejected`], records that
    /// failed to persist in [`ImportReport::failed`].
    pub fn import_document(&self, importer: &Importer, document: &str) -> Result<ImportReport> {
        let batch_id = Uuid::new_v4();
        let kind = importer.kind().to_string();

        let schema = self
            .codec
            .registry()
            .latest(&kind)
            .ok_or_else(|| codec::Error::UnknownKind(kind.clone()))?;
        let batch = importer.parse(document)?;
        let diagnostics = batch.diagnostics().to_vec();
        for note in &diagnostics {
            tracing::warn!(%batch_id, note = %note, "Import diagnostic");
        }
        let validation = importer.validate(batch, schema)?;

        let mut report = ImportReport {
            batch_id,
            kind,
            accepted_count: 0,
            rejected: validation.rejected,
            failed: Vec::new(),
            diagnostics,
        };
        for record in validation.accepted {
            match self.write(&record) {
                Ok(()) => report.accepted_count += 1,
                Err(e) => {
                    tracing::warn!(
                        %batch_id,
                        entity = %record.entity_id,
                        timestamp = %record.timestamp,
                        error = %e,
                        "Failed to write imported record"
                    );
                    report.failed.push(WriteFailure {
                        entity_id: record.entity_id,
                        timestamp: record.timestamp,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            %batch_id,
            kind = %report.kind,
            accepted = report.accepted_count,
            rejected = report.rejected.len(),
            failed = report.failed.len(),
            "Imported document"
        );
        Ok(report)
    }
}

/// Reads pinned to one point in time.
pub struct StoreSnapshot {
    snapshot: Snapshot,
    codec: Arc<RecordCodec>,
    decode: DecodePolicy,
}

impl StoreSnapshot {
    pub fn get(&self, entity: &EntityId, timestamp: &Timestamp) -> Result<Option<Record>> {
        let key = RecordKey::new(entity.clone(), timestamp).encode()?;
        self.snapshot
            .get(&key)?
            .map(|value| decode_entry(&self.codec, &key, &value))
            .transpose()
    }

    pub fn read(
        &self,
        entity: &EntityId,
        range: impl RangeBounds<Timestamp>,
    ) -> Result<Records<&Snapshot>> {
        let keys = time_range(entity, &range)?;
        Ok(Records::new(
            self.snapshot.scan(keys),
            Arc::clone(&self.codec),
            self.decode,
        ))
    }
}
