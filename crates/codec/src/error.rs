use thiserror::Error;

/// Codec and schema errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The byte sequence is truncated, tampered with, or not a record frame.
    #[error("corrupt record: {reason}")]
    CorruptRecord { reason: String },

    /// The record was written under a schema version this reader does not know.
    #[error("unsupported schema: '{kind}' v{version} (latest known v{latest})")]
    UnsupportedSchema {
        kind: String,
        version: u32,
        latest: u32,
    },

    /// The record kind is not registered at all.
    #[error("unknown record kind: '{0}'")]
    UnknownKind(String),

    /// The decoded record is of a different kind than the caller asked for.
    #[error("record kind mismatch: expected '{expected}', found '{found}'")]
    KindMismatch { expected: String, found: String },

    /// A schema definition is invalid or breaks the append-only rule.
    #[error("invalid schema '{kind}' v{version}: {reason}")]
    InvalidSchema {
        kind: String,
        version: u32,
        reason: String,
    },

    /// No upgrade function bridges a stored version to the next one.
    #[error("no upgrade registered for '{kind}' from v{from}")]
    MissingUpgrade { kind: String, from: u32 },

    /// The encoded record body exceeds what a frame can carry.
    #[error("record too large: {len} bytes (limit {max})")]
    RecordTooLarge { len: usize, max: usize },
}

impl Error {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptRecord {
            reason: reason.into(),
        }
    }

    /// Whether this error comes from reading stored bytes (as opposed to
    /// a programming or configuration mistake).
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Error::CorruptRecord { .. }
                | Error::UnsupportedSchema { .. }
                | Error::UnknownKind(_)
                | Error::KindMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
