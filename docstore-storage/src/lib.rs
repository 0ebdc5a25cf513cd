//! Docstore Storage - Content Store, Access Cache and Document Service
//!
//! Defines the [`ContentStore`] abstraction, an in-memory implementation used
//! by tests and local runs, the dual-index [`AccessCache`], and the
//! [`DocumentService`] that ties them together. The PostgreSQL store lives in
//! docstore-api.

pub mod cache;
pub mod memory;
pub mod service;
pub mod store;

pub use cache::{AccessCache, AccessCacheStats};
pub use memory::InMemoryContentStore;
pub use service::DocumentService;
pub use store::{ContentSink, ContentSource, ContentStore, CHUNK_SIZE};
