//! Content store abstraction.
//!
//! The content store is the authoritative home of document metadata rows and
//! of the bytes behind them. File documents keep their bytes in a separate
//! binary object referenced by [`ContentRef`]; inline documents keep an opaque
//! payload next to the row.
//!
//! Every operation runs in its own transaction. A failed or cancelled save
//! leaves neither a row nor a binary object behind.

use async_trait::async_trait;
use docstore_core::{AccessorKind, ContentRef, DocResult, DocumentId, DocumentMeta, Filter};
use tokio::io::{AsyncRead, AsyncWrite};

/// Chunk size used when copying content into or out of binary storage.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Byte stream supplying the content of a file document.
pub type ContentSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Destination for the content of a file document.
pub type ContentSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Durable, transactional storage for documents.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist a new document.
    ///
    /// `meta.id` is assigned by the caller. For a file document `content`
    /// must be present and is copied fully before the row is written; for an
    /// inline document `payload` must be present. Returns the committed
    /// metadata with `created_at`, `size` and `content_ref` filled in.
    async fn save(
        &self,
        owner: &str,
        content: Option<ContentSource<'_>>,
        payload: Option<&[u8]>,
        meta: DocumentMeta,
    ) -> DocResult<DocumentMeta>;

    /// Documents related to `identity` through `kind` that satisfy `filter`,
    /// newest first, at most `limit` of them.
    async fn list(
        &self,
        kind: AccessorKind,
        identity: &str,
        filter: &Filter,
        limit: usize,
    ) -> DocResult<Vec<DocumentMeta>>;

    /// Metadata row for `id`.
    async fn get_metadata(&self, id: DocumentId) -> DocResult<DocumentMeta>;

    /// Stream the bytes behind `content_ref` into `sink`. Returns the number
    /// of bytes copied.
    async fn read_content(&self, content_ref: ContentRef, sink: ContentSink<'_>) -> DocResult<u64>;

    /// Inline payload of a non-file document.
    async fn read_payload(&self, id: DocumentId) -> DocResult<Vec<u8>>;

    /// Remove the row for `id` together with its binary content.
    async fn delete(&self, id: DocumentId) -> DocResult<()>;

    /// Cheap connectivity check.
    async fn health_check(&self) -> DocResult<()>;
}
