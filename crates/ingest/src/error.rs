use thiserror::Error;

use crate::DocumentFormat;

/// Import pipeline errors.
///
/// These fail a whole import call. Problems with single entries are
/// reported as [`RejectReason`](crate::RejectReason)s instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The document could not be parsed; nothing from it is imported.
    #[error("malformed {format} document: {reason}")]
    MalformedDocument {
        format: DocumentFormat,
        reason: String,
    },

    /// The import configuration names a field the schema does not have.
    #[error("schema '{kind}' has no field '{field}'")]
    UnknownField { kind: String, field: String },

    #[error("invalid import config: {0}")]
    Config(String),

    #[error("failed to read import config: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
