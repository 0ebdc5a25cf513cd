//! Error types for docstore operations

use crate::{ContentRef, DocumentId};
use thiserror::Error;

/// Errors surfaced by the content store and the document service.
///
/// A cache miss is not an error and never appears here; cache lookups
/// return `Option` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocError {
    /// No metadata row for the id, or a delete raced to zero rows.
    #[error("Document not found: {id}")]
    NotFound { id: DocumentId },

    /// The large object behind a content reference no longer exists.
    #[error("Content not found: large object {content_ref}")]
    ContentNotFound { content_ref: ContentRef },

    /// Filter key outside the allow-list, or a value that does not parse for it.
    #[error("Invalid filter on '{key}': {reason}")]
    InvalidFilter { key: String, reason: String },

    /// Request shape does not match the document kind (e.g. a file without bytes).
    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String },

    /// I/O failure while streaming content into or out of binary storage.
    #[error("Content copy failed: {reason}")]
    ContentCopyFailed { reason: String },

    /// Connection, pool or transaction failure in the backing store.
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },
}

impl DocError {
    /// Create a NotFound error.
    pub fn not_found(id: DocumentId) -> Self {
        Self::NotFound { id }
    }

    /// Create an InvalidFilter error.
    pub fn invalid_filter(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidDocument error.
    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    /// Create a ContentCopyFailed error.
    pub fn content_copy_failed(reason: impl Into<String>) -> Self {
        Self::ContentCopyFailed {
            reason: reason.into(),
        }
    }

    /// Create a StoreUnavailable error.
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// True for the "no such document" family.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ContentNotFound { .. })
    }
}

impl From<std::io::Error> for DocError {
    fn from(err: std::io::Error) -> Self {
        DocError::content_copy_failed(err.to_string())
    }
}

/// Result type alias for docstore operations.
pub type DocResult<T> = Result<T, DocError>;

// =============================================================================
// TESTS
// =============================================================================
