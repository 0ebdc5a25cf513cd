//! In-memory content store.
//!
//! Mirrors the transactional behaviour of the PostgreSQL store closely enough
//! for service-level tests: content is staged completely before anything is
//! published, rows and binary objects are kept in separate maps so an orphaned
//! object is observable, and listings order by `created_at` descending.

use crate::store::{ContentSink, ContentSource, ContentStore, CHUNK_SIZE};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use docstore_core::{
    AccessorKind, ContentRef, DocError, DocResult, DocumentId, DocumentMeta, Filter,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone)]
struct Row {
    meta: DocumentMeta,
    payload: Option<Vec<u8>>,
}

/// Content store backed by process memory.
#[derive(Debug)]
pub struct InMemoryContentStore {
    rows: RwLock<HashMap<DocumentId, Row>>,
    objects: RwLock<HashMap<ContentRef, Arc<Vec<u8>>>>,
    next_oid: AtomicU32,
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            // PostgreSQL hands out user OIDs from 16384 upward.
            next_oid: AtomicU32::new(16384),
        }
    }
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of metadata rows.
    pub fn row_count(&self) -> usize {
        self.read_rows().len()
    }

    /// Number of binary objects, referenced or not.
    pub fn object_count(&self) -> usize {
        self.read_objects().len()
    }

    /// Whether a binary object exists for `content_ref`.
    pub fn contains_object(&self, content_ref: ContentRef) -> bool {
        self.read_objects().contains_key(&content_ref)
    }

    fn read_rows(&self) -> RwLockReadGuard<'_, HashMap<DocumentId, Row>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_rows(&self) -> RwLockWriteGuard<'_, HashMap<DocumentId, Row>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_objects(&self) -> RwLockReadGuard<'_, HashMap<ContentRef, Arc<Vec<u8>>>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_objects(&self) -> RwLockWriteGuard<'_, HashMap<ContentRef, Arc<Vec<u8>>>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn stage_content(content: ContentSource<'_>) -> DocResult<Vec<u8>> {
    let mut staged = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = content.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        staged.extend_from_slice(&chunk[..n]);
    }
    Ok(staged)
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn save(
        &self,
        owner: &str,
        content: Option<ContentSource<'_>>,
        payload: Option<&[u8]>,
        mut meta: DocumentMeta,
    ) -> DocResult<DocumentMeta> {
        meta.owner = owner.to_string();
        meta.created_at = Utc::now().trunc_subsecs(6);

        let (object, payload) = if meta.is_file {
            let content = content
                .ok_or_else(|| DocError::invalid_document("file document without content"))?;
            let bytes = stage_content(content).await?;
            meta.size = bytes.len() as i64;
            (Some(bytes), None)
        } else {
            let payload =
                payload.ok_or_else(|| DocError::invalid_document("inline document without payload"))?;
            meta.size = payload.len() as i64;
            (None, Some(payload.to_vec()))
        };

        // Publish row and object under both locks so readers never see one
        // without the other.
        let mut rows = self.write_rows();
        if rows.contains_key(&meta.id) {
            return Err(DocError::store_unavailable(format!(
                "duplicate document id {}",
                meta.id
            )));
        }
        let mut objects = self.write_objects();
        meta.content_ref = match object {
            Some(bytes) => {
                let content_ref = ContentRef::new(self.next_oid.fetch_add(1, Ordering::Relaxed));
                objects.insert(content_ref, Arc::new(bytes));
                Some(content_ref)
            }
            None => None,
        };
        rows.insert(
            meta.id,
            Row {
                meta: meta.clone(),
                payload,
            },
        );

        tracing::debug!(document_id = %meta.id, owner = %meta.owner, size = meta.size, "Saved document");
        Ok(meta)
    }

    async fn list(
        &self,
        kind: AccessorKind,
        identity: &str,
        filter: &Filter,
        limit: usize,
    ) -> DocResult<Vec<DocumentMeta>> {
        let rows = self.read_rows();
        let mut docs: Vec<DocumentMeta> = rows
            .values()
            .filter(|row| row.meta.is_accessible_as(kind, identity) && filter.matches(&row.meta))
            .map(|row| row.meta.clone())
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn get_metadata(&self, id: DocumentId) -> DocResult<DocumentMeta> {
        self.read_rows()
            .get(&id)
            .map(|row| row.meta.clone())
            .ok_or_else(|| DocError::not_found(id))
    }

    async fn read_content(&self, content_ref: ContentRef, sink: ContentSink<'_>) -> DocResult<u64> {
        let bytes = self
            .read_objects()
            .get(&content_ref)
            .cloned()
            .ok_or(DocError::ContentNotFound { content_ref })?;

        for chunk in bytes.chunks(CHUNK_SIZE) {
            sink.write_all(chunk).await?;
        }
        sink.flush().await?;
        Ok(bytes.len() as u64)
    }

    async fn read_payload(&self, id: DocumentId) -> DocResult<Vec<u8>> {
        let rows = self.read_rows();
        let row = rows.get(&id).ok_or_else(|| DocError::not_found(id))?;
        row.payload
            .clone()
            .ok_or_else(|| DocError::invalid_document("file documents have no inline payload"))
    }

    async fn delete(&self, id: DocumentId) -> DocResult<()> {
        let mut rows = self.write_rows();
        let row = rows.remove(&id).ok_or_else(|| DocError::not_found(id))?;
        if let Some(content_ref) = row.meta.content_ref {
            self.write_objects().remove(&content_ref);
        }
        tracing::debug!(document_id = %id, "Deleted document");
        Ok(())
    }

    async fn health_check(&self) -> DocResult<()> {
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{new_document_id, DocumentDraft};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Yields `good` bytes, then fails.
    struct BrokenReader {
        good: Vec<u8>,
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if !self.sent {
                self.sent = true;
                let good = std::mem::take(&mut self.good);
                buf.put_slice(&good);
                return Poll::Ready(Ok(()));
            }
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "upload aborted")))
        }
    }

    fn file_meta(owner: &str, name: &str) -> DocumentMeta {
        DocumentMeta::from_draft(new_document_id(), owner, DocumentDraft::file(name, "text/plain"))
    }

    #[tokio::test]
    async fn test_save_file_records_size_and_object() {
        let store = InMemoryContentStore::new();
        let mut content: &[u8] = b"hello";
        let saved = store
            .save("alice", Some(&mut content), None, file_meta("alice", "a.txt"))
            .await
            .unwrap();

        assert_eq!(saved.size, 5);
        let content_ref = saved.content_ref.unwrap();
        assert!(store.contains_object(content_ref));

        let mut out: Vec<u8> = Vec::new();
        let copied = store.read_content(content_ref, &mut out).await.unwrap();
        assert_eq!(copied, 5);
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_nothing_behind() {
        let store = InMemoryContentStore::new();
        let mut reader = BrokenReader {
            good: vec![7u8; 1024],
            sent: false,
        };
        let meta = file_meta("alice", "broken.bin");
        let id = meta.id;

        let err = store.save("alice", Some(&mut reader), None, meta).await.unwrap_err();
        assert!(matches!(err, DocError::ContentCopyFailed { .. }));
        assert_eq!(store.row_count(), 0);
        assert_eq!(store.object_count(), 0);
        assert!(store.get_metadata(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_inline_payload_round_trip() {
        let store = InMemoryContentStore::new();
        let meta = DocumentMeta::from_draft(new_document_id(), "alice", DocumentDraft::json("cfg"));
        let saved = store
            .save("alice", None, Some(br#"{"a":1}"#), meta)
            .await
            .unwrap();

        assert!(saved.content_ref.is_none());
        assert_eq!(store.object_count(), 0);
        assert_eq!(store.read_payload(saved.id).await.unwrap(), br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_rejected() {
        let store = InMemoryContentStore::new();
        let err = store
            .save("alice", None, Some(b"x"), file_meta("alice", "a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::InvalidDocument { .. }));

        let meta = DocumentMeta::from_draft(new_document_id(), "alice", DocumentDraft::json("j"));
        let err = store.save("alice", None, None, meta).await.unwrap_err();
        assert!(matches!(err, DocError::InvalidDocument { .. }));
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_read_payload_of_file_is_invalid() {
        let store = InMemoryContentStore::new();
        let mut content: &[u8] = b"bytes";
        let saved = store
            .save("alice", Some(&mut content), None, file_meta("alice", "f"))
            .await
            .unwrap();
        let err = store.read_payload(saved.id).await.unwrap_err();
        assert!(matches!(err, DocError::InvalidDocument { .. }));
    }

    #[tokio::test]
    async fn test_delete_unlinks_object_and_is_not_repeatable() {
        let store = InMemoryContentStore::new();
        let mut content: &[u8] = b"hello";
        let saved = store
            .save("alice", Some(&mut content), None, file_meta("alice", "a.txt"))
            .await
            .unwrap();
        let content_ref = saved.content_ref.unwrap();

        store.delete(saved.id).await.unwrap();
        assert!(!store.contains_object(content_ref));
        assert!(store.delete(saved.id).await.unwrap_err().is_not_found());

        let mut out: Vec<u8> = Vec::new();
        let err = store.read_content(content_ref, &mut out).await.unwrap_err();
        assert!(matches!(err, DocError::ContentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_and_limits() {
        let store = InMemoryContentStore::new();
        for _ in 0..3 {
            let meta =
                DocumentMeta::from_draft(new_document_id(), "alice", DocumentDraft::json("same"));
            store.save("alice", None, Some(b"{}"), meta).await.unwrap();
        }

        let docs = store
            .list(AccessorKind::Owner, "alice", &Filter::name("same"), 2)
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].created_at >= docs[1].created_at);

        let none = store
            .list(AccessorKind::Grantee, "alice", &Filter::name("same"), 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
