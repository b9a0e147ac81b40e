//! Document import: parse JSON or TOML documents into candidate entries
//! and validate them into [`codec::Record`]s.
//!
//! An [`Importer`] is built from an [`ImportConfig`] naming the record
//! kind, where entries live in the document, and how their elements map
//! onto schema fields. Parsing fails only for the document as a whole;
//! validation sorts each entry into accepted records or rejections with a
//! [`RejectReason`].

mod batch;
mod config;
mod document;
mod error;
mod importer;
mod timestamp;
mod validate;

pub use batch::{Candidate, ImportBatch};
pub use config::{DocumentFormat, ImportConfig};
pub use error::{Error, Result};
pub use importer::Importer;
pub use validate::{RejectReason, Rejection, Validation};
