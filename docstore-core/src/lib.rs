//! Docstore Core - Document Types
//!
//! Plain data types shared by every docstore crate: document metadata,
//! identifiers, listing filters and the error taxonomy. No I/O lives here.

pub mod document;
pub mod error;
pub mod filter;
pub mod identity;

pub use document::{AccessorKind, DocumentDraft, DocumentMeta};
pub use error::{DocError, DocResult};
pub use filter::{Filter, FilterKey, FilterValue};
pub use identity::{new_document_id, ContentRef, DocumentId, Timestamp};
