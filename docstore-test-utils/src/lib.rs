//! Docstore Test Utilities
//!
//! Shared test infrastructure for the docstore workspace:
//! - Proptest generators for identities, drafts and metadata
//! - Test fixtures for common scenarios
//! - Readers that fail mid-upload
//! - Custom assertions for docstore-specific validation

// Re-export core types for convenience
pub use docstore_core::{
    new_document_id, AccessorKind, ContentRef, DocError, DocResult, DocumentDraft, DocumentId,
    DocumentMeta, Filter, FilterKey, FilterValue, Timestamp,
};
pub use docstore_storage::{AccessCache, DocumentService, InMemoryContentStore};

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

// ============================================================================
// FAILING READERS
// ============================================================================

/// Reader that yields `good` bytes and then fails, like a client that drops
/// its connection halfway through an upload.
#[derive(Debug, Clone)]
pub struct FailingReader {
    good: Vec<u8>,
    offset: usize,
    chunk: usize,
}

impl FailingReader {
    /// Yield `good` in reads of at most `chunk` bytes, then fail.
    pub fn new(good: Vec<u8>, chunk: usize) -> Self {
        Self {
            good,
            offset: 0,
            chunk: chunk.max(1),
        }
    }

    /// Fail on the very first read.
    pub fn immediately() -> Self {
        Self::new(Vec::new(), 1)
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.offset >= self.good.len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "upload aborted",
            )));
        }
        let end = (self.offset + self.chunk)
            .min(self.good.len())
            .min(self.offset + buf.remaining());
        let start = self.offset;
        buf.put_slice(&self.good[start..end]);
        self.offset = end;
        Poll::Ready(Ok(()))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating docstore types.

    use super::*;
    use proptest::prelude::*;

    /// Small identity alphabet so generated grants overlap with owners.
    pub fn arb_identity() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["alice", "bob", "carol", "dave", "erin"])
            .prop_map(str::to_string)
    }

    /// Grant list, possibly with duplicates and possibly naming the owner.
    pub fn arb_grant() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_identity(), 0..4)
    }

    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z]{1,8}\\.(txt|pdf|json)"
    }

    pub fn arb_mime() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["text/plain", "application/pdf", "image/png", ""])
            .prop_map(str::to_string)
    }

    /// Generate a Timestamp within 2020-2030, at microsecond precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64, 0u32..1_000_000).prop_map(|(secs, micros)| {
            chrono::DateTime::from_timestamp(secs, micros * 1000).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_draft() -> impl Strategy<Value = DocumentDraft> {
        (arb_name(), arb_mime(), any::<bool>(), any::<bool>(), arb_grant()).prop_map(
            |(name, mime, is_file, public, grant)| DocumentDraft {
                name,
                mime,
                is_file,
                public,
                grant,
            },
        )
    }

    /// Committed-looking metadata: file documents carry a content ref.
    pub fn arb_meta() -> impl Strategy<Value = DocumentMeta> {
        (arb_identity(), arb_draft(), arb_timestamp(), 16384u32..20000, 0i64..1 << 20).prop_map(
            |(owner, draft, created_at, oid, size)| {
                let mut meta = DocumentMeta::from_draft(new_document_id(), owner, draft);
                meta.content_ref = meta.is_file.then(|| ContentRef::new(oid));
                meta.created_at = created_at;
                meta.size = size;
                meta
            },
        )
    }

    pub fn arb_accessor_kind() -> impl Strategy<Value = AccessorKind> {
        prop_oneof![Just(AccessorKind::Owner), Just(AccessorKind::Grantee)]
    }

    /// Raw key/value pairs, valid and invalid, as they arrive from a client.
    pub fn arb_filter_input() -> impl Strategy<Value = (String, String)> {
        prop_oneof![
            arb_name().prop_map(|v| ("name".to_string(), v)),
            any::<bool>().prop_map(|v| ("public".to_string(), v.to_string())),
            any::<bool>().prop_map(|v| ("file".to_string(), v.to_string())),
            arb_mime().prop_map(|v| ("mime".to_string(), v)),
            "[a-z_;' ]{0,12}".prop_map(|k| (k, "x".to_string())),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use std::sync::Arc;

    /// Service over a fresh in-memory store and an empty cache.
    pub fn in_memory_service() -> DocumentService<InMemoryContentStore> {
        DocumentService::new(Arc::new(InMemoryContentStore::new()))
    }

    pub fn text_file(name: &str) -> DocumentDraft {
        DocumentDraft::file(name, "text/plain")
    }

    /// Save a file document with `bytes` as its content.
    pub async fn save_file<S: docstore_storage::ContentStore>(
        service: &DocumentService<S>,
        owner: &str,
        draft: DocumentDraft,
        bytes: &[u8],
    ) -> DocResult<DocumentMeta> {
        let mut reader: &[u8] = bytes;
        let source: docstore_storage::ContentSource<'_> = &mut reader;
        service.save_document(owner, Some(source), None, draft).await
    }

    /// Save an inline JSON document.
    pub async fn save_json<S: docstore_storage::ContentStore>(
        service: &DocumentService<S>,
        owner: &str,
        draft: DocumentDraft,
        value: &serde_json::Value,
    ) -> DocResult<DocumentMeta> {
        let payload = value.to_string();
        service
            .save_document(owner, None, Some(payload.as_bytes()), draft)
            .await
    }

    /// The three-user sharing scenario: alice owns `a.txt` shared with bob,
    /// bob owns `b.txt` shared with nobody. Carol has nothing.
    pub async fn alice_bob_carol<S: docstore_storage::ContentStore>(
        service: &DocumentService<S>,
    ) -> DocResult<(DocumentMeta, DocumentMeta)> {
        let a = save_file(
            service,
            "alice",
            text_file("a.txt").with_grant(["bob"]),
            b"alice's notes",
        )
        .await?;
        let b = save_file(service, "bob", text_file("b.txt"), b"bob's notes").await?;
        Ok((a, b))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for docstore-specific validation.

    use super::*;

    /// Assert that a DocResult is a NotFound error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DocResult<T>) {
        match result {
            Err(DocError::NotFound { .. }) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert that a DocResult is an InvalidFilter error.
    #[track_caller]
    pub fn assert_invalid_filter<T: std::fmt::Debug>(result: &DocResult<T>) {
        match result {
            Err(DocError::InvalidFilter { .. }) => {}
            other => panic!("Expected InvalidFilter error, got: {:?}", other),
        }
    }

    /// Assert the dual index of `cache` agrees with itself.
    #[track_caller]
    pub fn assert_cache_consistent(cache: &AccessCache) {
        assert!(cache.is_consistent(), "access cache index is inconsistent: {:?}", cache.stats());
    }

    /// Assert that two listings hold the same documents, in any order.
    #[track_caller]
    pub fn assert_same_documents(left: &[DocumentMeta], right: &[DocumentMeta]) {
        let mut l: Vec<DocumentId> = left.iter().map(|m| m.id).collect();
        let mut r: Vec<DocumentId> = right.iter().map(|m| m.id).collect();
        l.sort();
        r.sort();
        assert_eq!(l, r, "listings differ");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_failing_reader_yields_then_fails() {
        let mut reader = FailingReader::new(vec![7u8; 10], 4);
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 4);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 4);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 2);
        assert!(reader.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_alice_bob_carol_fixture() {
        let service = fixtures::in_memory_service();
        let (a, b) = fixtures::alice_bob_carol(&service).await.unwrap();
        assert_eq!(a.grant, vec!["bob".to_string()]);
        assert!(b.grant.is_empty());
        assertions::assert_cache_consistent(service.cache());
        assert_eq!(service.store().row_count(), 2);
    }

    proptest! {
        #[test]
        fn prop_generated_meta_shape(meta in generators::arb_meta()) {
            prop_assert_eq!(meta.is_file, meta.content_ref.is_some());
            prop_assert!(!meta.name.is_empty());
        }

        #[test]
        fn prop_accessors_start_with_owner(meta in generators::arb_meta()) {
            let accessors = meta.accessors();
            prop_assert_eq!(&accessors[0], &meta.owner);
            let mut deduped = accessors.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), accessors.len());
        }
    }
}
