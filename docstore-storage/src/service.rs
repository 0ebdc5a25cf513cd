//! Document service
//!
//! Cache-aside orchestration over a [`ContentStore`] and an [`AccessCache`].
//! Writes go to the store first and reach the cache only after they commit;
//! identity-scoped reads try the cache and fall back to the store on a miss.
//! The service never retries a failed store call.

use crate::cache::AccessCache;
use crate::store::{ContentSink, ContentSource, ContentStore};
use docstore_core::{
    new_document_id, AccessorKind, ContentRef, DocError, DocResult, DocumentDraft, DocumentId,
    DocumentMeta, Filter,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Entry point for document operations.
pub struct DocumentService<S: ContentStore> {
    store: Arc<S>,
    cache: Arc<AccessCache>,
}

impl<S: ContentStore> Clone for DocumentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: ContentStore> DocumentService<S> {
    /// Create a service with an empty cache.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_cache(store, Arc::new(AccessCache::new()))
    }

    /// Create a service sharing an existing cache.
    pub fn with_cache(store: Arc<S>, cache: Arc<AccessCache>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<AccessCache> {
        &self.cache
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Assign a fresh id, persist the document and cache it for its owner and
    /// grantees. Returns the committed metadata.
    pub async fn save_document(
        &self,
        owner: &str,
        content: Option<ContentSource<'_>>,
        payload: Option<&[u8]>,
        draft: DocumentDraft,
    ) -> DocResult<DocumentMeta> {
        let meta = DocumentMeta::from_draft(new_document_id(), owner, draft);
        let saved = self.store.save(owner, content, payload, meta).await?;

        // The save is durable at this point; a failing cache must not undo it.
        let populated = panic::catch_unwind(AssertUnwindSafe(|| {
            self.cache.put(owner, saved.clone());
        }));
        if populated.is_err() {
            tracing::warn!(
                document_id = %saved.id,
                owner = %owner,
                "Cache population failed after save"
            );
        }

        tracing::info!(
            document_id = %saved.id,
            owner = %owner,
            is_file = saved.is_file,
            size = saved.size,
            "Document saved"
        );
        Ok(saved)
    }

    /// Remove `id` from the cache, then from the store.
    ///
    /// The cache entry goes first and unconditionally; a spurious eviction
    /// only costs a later store read.
    pub async fn delete_document(&self, id: DocumentId) -> DocResult<()> {
        self.cache.remove(id);
        self.store.delete(id).await?;
        tracing::info!(document_id = %id, "Document deleted");
        Ok(())
    }

    /// Evict every cached entry of `identity`. Returns how many were dropped.
    pub fn invalidate_identity(&self, identity: &str) -> usize {
        let evicted = self.cache.evict_identity(identity);
        tracing::info!(identity = %identity, evicted, "Identity invalidated");
        evicted
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// List documents related to `identity` through `kind`, filtered on one
    /// allow-listed field. The filter is validated before any lookup.
    pub async fn list_documents(
        &self,
        kind: AccessorKind,
        identity: &str,
        key: &str,
        value: &str,
        limit: usize,
    ) -> DocResult<Vec<DocumentMeta>> {
        let filter = Filter::parse(key, value)?;

        if let Some(docs) = self.cache.list(kind, identity, &filter, limit) {
            tracing::debug!(identity = %identity, kind = %kind, count = docs.len(), "List served from cache");
            return Ok(docs);
        }

        // Fallback results are not written back to the cache.
        let docs = self.store.list(kind, identity, &filter, limit).await?;
        tracing::debug!(identity = %identity, kind = %kind, count = docs.len(), "List served from store");
        Ok(docs)
    }

    /// Metadata of `id` as seen by `identity`.
    ///
    /// A document the identity may not read is reported as not found.
    pub async fn get_document_metadata(
        &self,
        id: DocumentId,
        identity: &str,
    ) -> DocResult<DocumentMeta> {
        if let Some(meta) = self.cache.get(id, identity) {
            return Ok(DocumentMeta::clone(&meta));
        }

        let meta = self.store.get_metadata(id).await?;
        if !meta.is_visible_to(identity) {
            tracing::debug!(document_id = %id, identity = %identity, "Document not visible to identity");
            return Err(DocError::not_found(id));
        }
        Ok(meta)
    }

    /// Stream a file document's bytes into `sink`.
    pub async fn read_document_content(
        &self,
        content_ref: ContentRef,
        sink: ContentSink<'_>,
    ) -> DocResult<u64> {
        self.store.read_content(content_ref, sink).await
    }

    /// Inline payload of a non-file document.
    pub async fn read_document_payload(&self, id: DocumentId) -> DocResult<Vec<u8>> {
        self.store.read_payload(id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
