//! Typed records and their schema-versioned binary encoding.
//!
//! A [`Record`] is one timestamped event about an entity. Its payload is an
//! ordered set of tagged [`Field`]s whose layout is described by a
//! [`Schema`]. Schemas of one record kind form an append-only lineage kept
//! in a [`SchemaRegistry`], together with one pure upgrade function per
//! version transition.
//!
//! # Encoding
//!
//! [`encode`] turns a record into a self-describing frame: magic, format
//! byte, body length, a protobuf body with fixed-width numbers, and a
//! truncated SHA-256 digest. [`RecordCodec::decode`] verifies the frame and
//! refuses versions the registry does not know instead of guessing.
//!
//! ```
//! use std::sync::Arc;
//! use codec::{FieldType, Record, RecordCodec, Schema, SchemaRegistry, Timestamp};
//!
//! let registry = SchemaRegistry::new()
//!     .with_schema(Schema::new("screening", 1).required(1, "title", FieldType::Text))?;
//! let codec = RecordCodec::new(Arc::new(registry));
//!
//! let record = Record::new("screening", "odeon", Timestamp::from_micros(0), 1)
//!     .with_field(1, "title", "Alien");
//! let bytes = codec.encode(&record)?;
//! assert_eq!(codec.decode(&bytes, "screening")?, record);
//! # Ok::<(), codec::Error>(())
//! ```

mod codec;
mod error;
mod record;
mod registry;
mod schema;
mod time;
mod value;
pub mod wire;

pub use codec::{RecordCodec, UnknownFields, decode_raw, encode};
pub use error::{Error, Result};
pub use record::{EntityId, Field, Payload, Record};
pub use registry::{SchemaRegistry, Upgrade};
pub use schema::{FieldDef, Schema, SchemaViolation};
pub use time::Timestamp;
pub use value::{FieldType, Value};
