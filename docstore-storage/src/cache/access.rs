//! Dual-index access cache.
//!
//! Two maps are kept in step under one lock:
//!
//! - `id_to_identities`: document id to every identity holding a bucket entry
//!   for it (owner first, then distinct grantees).
//! - `identity_to_docs`: identity to the metadata entries it can see.
//!
//! Invariant: every identity listed under an id has exactly one entry for that
//! id in its bucket, and every bucket entry's id lists the bucket's identity.
//! Empty buckets and empty access lists are dropped. Only [`AccessCache::put`],
//! [`AccessCache::remove`] and [`AccessCache::evict_identity`] mutate.

use docstore_core::{AccessorKind, DocumentId, DocumentMeta, Filter};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct AccessIndex {
    id_to_identities: HashMap<DocumentId, Vec<String>>,
    identity_to_docs: HashMap<String, Vec<Arc<DocumentMeta>>>,
}

impl AccessIndex {
    fn insert(&mut self, owner: &str, mut meta: DocumentMeta) {
        self.remove(meta.id);

        if meta.owner != owner {
            meta.owner = owner.to_string();
        }
        let identities = meta.accessors();

        let entry = Arc::new(meta);
        for identity in &identities {
            self.identity_to_docs
                .entry(identity.clone())
                .or_default()
                .push(Arc::clone(&entry));
        }
        self.id_to_identities.insert(entry.id, identities);
    }

    fn remove(&mut self, id: DocumentId) -> bool {
        let Some(identities) = self.id_to_identities.remove(&id) else {
            return false;
        };
        for identity in &identities {
            if let Some(bucket) = self.identity_to_docs.get_mut(identity) {
                if let Some(pos) = bucket.iter().position(|m| m.id == id) {
                    bucket.swap_remove(pos);
                }
                if bucket.is_empty() {
                    self.identity_to_docs.remove(identity);
                }
            }
        }
        true
    }

    fn evict(&mut self, identity: &str) -> usize {
        let Some(bucket) = self.identity_to_docs.remove(identity) else {
            return 0;
        };
        for meta in &bucket {
            if let Some(identities) = self.id_to_identities.get_mut(&meta.id) {
                if let Some(pos) = identities.iter().position(|i| i == identity) {
                    identities.swap_remove(pos);
                }
                if identities.is_empty() {
                    self.id_to_identities.remove(&meta.id);
                }
            }
        }
        bucket.len()
    }

    fn is_consistent(&self) -> bool {
        let forward = self.id_to_identities.iter().all(|(id, identities)| {
            !identities.is_empty()
                && identities.iter().all(|identity| {
                    self.identity_to_docs
                        .get(identity)
                        .map(|bucket| bucket.iter().filter(|m| m.id == *id).count() == 1)
                        .unwrap_or(false)
                })
        });
        let backward = self.identity_to_docs.iter().all(|(identity, bucket)| {
            !bucket.is_empty()
                && bucket.iter().all(|meta| {
                    self.id_to_identities
                        .get(&meta.id)
                        .map(|identities| identities.iter().any(|i| i == identity))
                        .unwrap_or(false)
                })
        });
        forward && backward
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessCacheStats {
    /// Distinct cached documents.
    pub documents: usize,
    /// Identities with a bucket.
    pub identities: usize,
    /// Bucket entries across all identities.
    pub entries: usize,
}

/// In-process mirror of document visibility, keyed both ways.
///
/// Unbounded and without expiry: entries leave only through
/// [`remove`](Self::remove) or [`evict_identity`](Self::evict_identity).
#[derive(Debug, Default)]
pub struct AccessCache {
    index: RwLock<AccessIndex>,
}

impl AccessCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, AccessIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AccessIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache `meta` for `owner` and every grantee.
    ///
    /// A document that is already cached has its previous entries replaced.
    pub fn put(&self, owner: &str, meta: DocumentMeta) {
        self.write().insert(owner, meta);
    }

    /// Entry for `id` in `identity`'s bucket. `None` is a miss.
    pub fn get(&self, id: DocumentId, identity: &str) -> Option<Arc<DocumentMeta>> {
        self.read()
            .identity_to_docs
            .get(identity)?
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Cached documents related to `identity` through `kind` that satisfy
    /// `filter`, newest first.
    ///
    /// Returns `None` when the identity has no bucket, or when its bucket holds
    /// nothing related through `kind`: a bucket filled only by grants says
    /// nothing about the documents the identity owns. Otherwise returns `Some`
    /// of a possibly empty list.
    pub fn list(
        &self,
        kind: AccessorKind,
        identity: &str,
        filter: &Filter,
        limit: usize,
    ) -> Option<Vec<DocumentMeta>> {
        let index = self.read();
        let bucket = index.identity_to_docs.get(identity)?;
        if !bucket.iter().any(|m| m.is_accessible_as(kind, identity)) {
            return None;
        }
        let mut docs: Vec<DocumentMeta> = bucket
            .iter()
            .filter(|m| m.is_accessible_as(kind, identity) && filter.matches(m))
            .map(|m| DocumentMeta::clone(m))
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        docs.truncate(limit);
        Some(docs)
    }

    /// Drop every entry for `id`. Returns whether the document was cached.
    pub fn remove(&self, id: DocumentId) -> bool {
        self.write().remove(id)
    }

    /// Drop `identity`'s bucket and its back-references. Returns the number of
    /// entries evicted.
    pub fn evict_identity(&self, identity: &str) -> usize {
        self.write().evict(identity)
    }

    pub fn stats(&self) -> AccessCacheStats {
        let index = self.read();
        AccessCacheStats {
            documents: index.id_to_identities.len(),
            identities: index.identity_to_docs.len(),
            entries: index.identity_to_docs.values().map(Vec::len).sum(),
        }
    }

    /// Check the dual-index invariant.
    pub fn is_consistent(&self) -> bool {
        self.read().is_consistent()
    }
}

// ============================================================================
// TESTS
// ============================================================================
