//! PostgreSQL content store integration tests.
//!
//! Require a reachable database configured through the `DOCSTORE_DB_*`
//! variables. Each test migrates its own table under `docstore_test` and
//! drops it afterwards.

#![cfg(feature = "db-tests")]

use std::sync::{Arc, OnceLock};

use docstore_api::{ApiError, ApiResult, DbConfig, PgContentStore};
use docstore_core::{AccessorKind, ContentRef, DocError, DocumentDraft, DocumentMeta, Filter};
use docstore_storage::{ContentSink, ContentSource, ContentStore, DocumentService};
use docstore_test_utils::{assertions, fixtures, new_document_id, FailingReader};
use uuid::Uuid;

/// Serializes tests that create large objects, so the server-wide count in
/// `test_failed_copy_leaves_nothing` only sees its own changes.
fn large_object_lock() -> &'static tokio::sync::Mutex<()> {
    static LOCK: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| tokio::sync::Mutex::new(()))
}

async fn test_store() -> ApiResult<PgContentStore> {
    let config = DbConfig::from_env();
    let table = format!("docstore_test.meta_{}", Uuid::now_v7().simple());
    let store = PgContentStore::new(config.create_pool()?, table)?;
    store.migrate().await?;
    Ok(store)
}

async fn drop_table(store: &PgContentStore) -> ApiResult<()> {
    let conn = store.pool().get().await?;
    conn.batch_execute(&format!("DROP TABLE IF EXISTS {}", store.table()))
        .await?;
    Ok(())
}

async fn object_exists(store: &PgContentStore, content_ref: ContentRef) -> ApiResult<bool> {
    let conn = store.pool().get().await?;
    let row = conn
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_largeobject_metadata WHERE oid = $1)",
            &[&content_ref.oid()],
        )
        .await?;
    Ok(row.get(0))
}

async fn row_count(store: &PgContentStore) -> ApiResult<i64> {
    let conn = store.pool().get().await?;
    let row = conn
        .query_one(&format!("SELECT count(*) FROM {}", store.table()), &[])
        .await?;
    Ok(row.get(0))
}

async fn large_object_count(store: &PgContentStore) -> ApiResult<i64> {
    let conn = store.pool().get().await?;
    let row = conn
        .query_one("SELECT count(*) FROM pg_largeobject_metadata", &[])
        .await?;
    Ok(row.get(0))
}

fn file_meta(owner: &str, name: &str, grant: &[&str]) -> DocumentMeta {
    DocumentMeta::from_draft(
        new_document_id(),
        owner,
        DocumentDraft::file(name, "text/plain").with_grant(grant.iter().copied()),
    )
}

async fn read_all(store: &PgContentStore, content_ref: ContentRef) -> Result<Vec<u8>, DocError> {
    let mut out: Vec<u8> = Vec::new();
    let sink: ContentSink<'_> = &mut out;
    store.read_content(content_ref, sink).await?;
    Ok(out)
}

#[tokio::test]
async fn test_file_roundtrip_and_unlink() -> ApiResult<()> {
    let _serial = large_object_lock().lock().await;
    let store = test_store().await?;

    // Larger than one chunk so the copy loops.
    let bytes: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let mut reader: &[u8] = &bytes;
    let source: ContentSource<'_> = &mut reader;
    let saved = store
        .save("alice", Some(source), None, file_meta("alice", "big.bin", &["bob"]))
        .await?;

    assert_eq!(saved.size, bytes.len() as i64);
    let content_ref = saved.content_ref.ok_or_else(|| ApiError::internal_error("no content ref"))?;
    assert!(object_exists(&store, content_ref).await?);
    assert_eq!(read_all(&store, content_ref).await?, bytes);

    let fetched = store.get_metadata(saved.id).await?;
    assert_eq!(fetched, saved);

    store.delete(saved.id).await?;
    assert!(!object_exists(&store, content_ref).await?);
    assert!(store.delete(saved.id).await.unwrap_err().is_not_found());
    assert!(matches!(
        read_all(&store, content_ref).await,
        Err(DocError::ContentNotFound { .. })
    ));

    drop_table(&store).await
}

#[tokio::test]
async fn test_failed_copy_leaves_nothing() -> ApiResult<()> {
    let _serial = large_object_lock().lock().await;
    let store = test_store().await?;
    let objects_before = large_object_count(&store).await?;

    let mut reader = FailingReader::new(vec![1u8; 100_000], 4096);
    let source: ContentSource<'_> = &mut reader;
    let result = store
        .save("alice", Some(source), None, file_meta("alice", "half.bin", &[]))
        .await;

    assert!(matches!(result, Err(DocError::ContentCopyFailed { .. })));
    assert_eq!(row_count(&store).await?, 0);
    // The large object created before the failure is rolled back with the row.
    assert_eq!(large_object_count(&store).await?, objects_before);

    drop_table(&store).await
}

#[tokio::test]
async fn test_concurrent_deletes_remove_once() -> ApiResult<()> {
    let _serial = large_object_lock().lock().await;
    let store = test_store().await?;

    let mut reader: &[u8] = b"contended";
    let source: ContentSource<'_> = &mut reader;
    let saved = store
        .save("alice", Some(source), None, file_meta("alice", "race.txt", &[]))
        .await?;
    let content_ref = saved.content_ref.ok_or_else(|| ApiError::internal_error("no content ref"))?;

    let (first, second) = tokio::join!(store.delete(saved.id), store.delete(saved.id));
    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(DocError::NotFound { .. })))
            .count(),
        1
    );
    assert!(!object_exists(&store, content_ref).await?);
    assert_eq!(row_count(&store).await?, 0);

    drop_table(&store).await
}

#[tokio::test]
async fn test_inline_payload() -> ApiResult<()> {
    let store = test_store().await?;

    let meta = DocumentMeta::from_draft(new_document_id(), "alice", DocumentDraft::json("cfg"));
    let payload: &[u8] = br#"{"a":1}"#;
    let saved = store.save("alice", None, Some(payload), meta).await?;
    assert!(saved.content_ref.is_none());
    assert_eq!(saved.size, 7);
    assert_eq!(store.read_payload(saved.id).await?, payload);

    drop_table(&store).await
}

#[tokio::test]
async fn test_list_paths_and_order() -> ApiResult<()> {
    let _serial = large_object_lock().lock().await;
    let store = test_store().await?;

    for _ in 0..3 {
        let mut reader: &[u8] = b"x";
        let source: ContentSource<'_> = &mut reader;
        store
            .save("alice", Some(source), None, file_meta("alice", "same.txt", &["bob"]))
            .await?;
    }

    let filter = Filter::name("same.txt");
    let owned = store.list(AccessorKind::Owner, "alice", &filter, 10).await?;
    assert_eq!(owned.len(), 3);
    assert!(owned
        .windows(2)
        .all(|w| (w[0].created_at, w[0].id) >= (w[1].created_at, w[1].id)));

    let granted = store.list(AccessorKind::Grantee, "bob", &filter, 2).await?;
    assert_eq!(granted.len(), 2);
    assert!(store.list(AccessorKind::Owner, "bob", &filter, 10).await?.is_empty());
    assert!(store.list(AccessorKind::Grantee, "alice", &filter, 10).await?.is_empty());

    let public = Filter::parse("public", "true")?;
    assert!(store.list(AccessorKind::Owner, "alice", &public, 10).await?.is_empty());

    drop_table(&store).await
}

#[tokio::test]
async fn test_alice_bob_carol_against_postgres() -> ApiResult<()> {
    let _serial = large_object_lock().lock().await;
    let store = Arc::new(test_store().await?);
    let service = DocumentService::new(Arc::clone(&store));

    let (a, b) = fixtures::alice_bob_carol(&service).await?;

    assert_eq!(service.get_document_metadata(a.id, "bob").await?.id, a.id);
    assertions::assert_not_found(&service.get_document_metadata(a.id, "carol").await);
    assertions::assert_not_found(&service.get_document_metadata(b.id, "alice").await);

    // Cache and store agree once the cache is gone.
    let cached = service
        .list_documents(AccessorKind::Grantee, "bob", "name", "a.txt", 10)
        .await?;
    service.invalidate_identity("bob");
    let stored = service
        .list_documents(AccessorKind::Grantee, "bob", "name", "a.txt", 10)
        .await?;
    assertions::assert_same_documents(&cached, &stored);

    service.delete_document(a.id).await?;
    assertions::assert_not_found(&service.get_document_metadata(a.id, "alice").await);
    assertions::assert_cache_consistent(service.cache());

    drop_table(&store).await
}

#[tokio::test]
async fn test_concurrent_saves_get_distinct_ids() -> ApiResult<()> {
    let _serial = large_object_lock().lock().await;
    let store = Arc::new(test_store().await?);
    let service = DocumentService::new(Arc::clone(&store));

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            fixtures::save_file(&service, "alice", fixtures::text_file(&format!("f{}.txt", i)), b"x")
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let saved = handle
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))??;
        ids.push(saved.id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(row_count(&store).await?, 16);

    drop_table(&store).await
}
