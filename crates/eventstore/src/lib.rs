//! Durable, schema-versioned, time-ordered records per entity.
//!
//! [`EventStore`] ties the pieces together: it checks records against the
//! [`codec::SchemaRegistry`], encodes them with [`codec::RecordCodec`],
//! keys them by `(entity, instant)` and keeps them in a [`storage::Storage`]
//! directory. Reads are lazy, time-ascending and upgrade every record to the
//! latest schema version of its kind. Documents are imported through an
//! [`ingest::Importer`] with a per-entry [`ImportReport`].
//!
//! ```no_run
//! use codec::{EntityId, FieldType, Schema, SchemaRegistry};
//! use eventstore::{EventStore, StoreConfig};
//!
//! let registry = SchemaRegistry::new()
//!     .with_schema(Schema::new("screening", 1).required(1, "title", FieldType::Text))?;
//! let store = EventStore::open(&StoreConfig::new("data"), registry)?;
//!
//! for record in store.read(&EntityId::new("odeon"), ..)? {
//!     println!("{:?}", record?);
//! }
//! # Ok::<(), eventstore::Error>(())
//! ```

mod config;
mod error;
mod key;
mod read;
mod report;
mod store;

pub use config::{DecodePolicy, StoreConfig};
pub use error::{Error, Result};
pub use key::RecordKey;
pub use read::Records;
pub use report::{ImportReport, WriteFailure};
pub use storage::Stats;
pub use store::{EventStore, StoreSnapshot};
