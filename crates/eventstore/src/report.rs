//! Import outcome reporting.

use codec::{EntityId, Timestamp};
use ingest::Rejection;
use serde::Serialize;
use uuid::Uuid;

/// An accepted record that could not be persisted.
#[derive(Debug, Clone, Serialize)]
pub struct WriteFailure {
    pub entity_id: EntityId,
    pub timestamp: Timestamp,
    pub error: String,
}

/// Outcome of importing one document.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Correlates this import's log events.
    pub batch_id: Uuid,
    pub kind: String,
    /// Records validated and durably written.
    pub accepted_count: usize,
    pub rejected: Vec<Rejection>,
    pub failed: Vec<WriteFailure>,
    /// Notes from parsing the document.
    pub diagnostics: Vec<String>,
}

impl ImportReport {
    /// Entries seen in the document.
    pub fn total(&self) -> usize {
        self.accepted_count + self.rejected.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.failed.is_empty()
    }
}
