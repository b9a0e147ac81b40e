//! Parsed, not yet validated, import batches.

use serde_json::Value as Json;

/// One entry of a document, by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub source: Json,
}

/// Entries extracted from one document for one record kind.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    kind: String,
    candidates: Vec<Candidate>,
    diagnostics: Vec<String>,
}

impl ImportBatch {
    pub(crate) fn new(kind: String, candidates: Vec<Candidate>, diagnostics: Vec<String>) -> Self {
        Self {
            kind,
            candidates,
            diagnostics,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Notes about the document that did not prevent parsing.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub(crate) fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }
}
