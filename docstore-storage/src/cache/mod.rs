//! In-process access cache.
//!
//! The cache mirrors which identities can see which documents so that
//! identity-scoped reads avoid a store round-trip. It is never a source of
//! truth: a miss is an ordinary outcome and callers fall back to the
//! [`ContentStore`](crate::ContentStore).
//!
//! # Miss versus empty
//!
//! [`AccessCache::list`] returns `None` when the identity has no bucket and
//! `Some(vec![])` when the bucket exists but nothing matches. Only the former
//! sends the caller to the store.

pub mod access;

pub use access::{AccessCache, AccessCacheStats};
