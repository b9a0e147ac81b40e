//! Event store error types.

use codec::{SchemaViolation, Timestamp};
use thiserror::Error;

/// Event store errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A record does not fit the schema of its declared version.
    #[error("'{kind}' v{version} record for '{entity_id}' at {timestamp}: {violation}")]
    Validation {
        kind: String,
        version: u32,
        entity_id: String,
        timestamp: Timestamp,
        #[source]
        violation: SchemaViolation,
    },

    /// An entity id that cannot form a key, or a stored key that does not
    /// belong to its record.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Codec(#[from] codec::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Ingest(#[from] ingest::Error),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a read under the skip policy may step over this error.
    pub(crate) fn is_skippable(&self) -> bool {
        match self {
            Error::Codec(e) => e.is_decode_failure(),
            Error::InvalidKey(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
