//! Docstore API - HTTP Layer
//!
//! Axum server exposing the document service over REST, the PostgreSQL
//! content store (metadata rows plus large objects), the users service
//! gateway and the cache invalidation endpoint with its client.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod invalidation;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ApiConfig, LogFormat};
pub use db::{DbConfig, PgContentStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use extract::{AuthIdentity, DocumentPath, RequestToken};
pub use gateway::{HttpUsersGateway, StaticUsersGateway, UsersGateway};
pub use invalidation::{InvalidateRequest, InvalidationClient};
pub use routes::{create_internal_router, create_router};
pub use state::AppState;
