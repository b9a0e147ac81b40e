//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The configuration file is missing, unreadable or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No `[imports.<name>]` table matches the requested profile.
    #[error("no import profile '{name}' (configured: {known:?})")]
    UnknownProfile { name: String, known: Vec<String> },

    #[error("invalid timestamp '{value}': expected RFC 3339, e.g. 2024-03-01T20:00:00Z")]
    InvalidTimestamp { value: String },

    /// A directory given to `import` holds no document of the profile's format.
    #[error("no .{extension} documents in {path}")]
    NoDocuments { path: PathBuf, extension: &'static str },

    /// Some documents could not be imported; the others were.
    #[error("{failed} of {total} documents failed to import")]
    ImportIncomplete { failed: usize, total: usize },

    #[error(transparent)]
    Store(#[from] eventstore::Error),

    #[error(transparent)]
    Ingest(#[from] ingest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
