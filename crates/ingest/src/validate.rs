//! Validation outcome types.

use codec::{FieldType, Record, Timestamp};
use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;

/// Why an entry was not turned into a record.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("no entity id at '{path}'")]
    MissingEntityId { path: String },

    #[error("entity id is {length} bytes, limit is {max}")]
    InvalidEntityId { length: usize, max: usize },

    #[error("no timestamp at '{path}'")]
    MissingTimestamp { path: String },

    #[error("unreadable timestamp {value}")]
    InvalidTimestamp { value: String },

    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' expects {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: String,
    },

    #[error("entity '{entity_id}' at {timestamp} already appears as entry {first}")]
    DuplicateKey {
        entity_id: String,
        timestamp: Timestamp,
        first: usize,
    },
}

impl RejectReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NotAnObject => "not_an_object",
            RejectReason::MissingEntityId { .. } => "missing_entity_id",
            RejectReason::InvalidEntityId { .. } => "invalid_entity_id",
            RejectReason::MissingTimestamp { .. } => "missing_timestamp",
            RejectReason::InvalidTimestamp { .. } => "invalid_timestamp",
            RejectReason::MissingField { .. } => "missing_field",
            RejectReason::TypeMismatch { .. } => "type_mismatch",
            RejectReason::DuplicateKey { .. } => "duplicate_key",
        }
    }
}

/// A refused entry with its original content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub candidate: Json,
    pub reason: RejectReason,
}

/// Result of validating a batch: every entry ends up in exactly one list.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    /// Records in document order.
    pub accepted: Vec<Record>,
    /// Rejections in document order.
    pub rejected: Vec<Rejection>,
}

impl Validation {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}
