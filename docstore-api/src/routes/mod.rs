//! REST API Routes Module
//!
//! Includes:
//! - Document routes under /api/v1/docs (token authenticated)
//! - Health check endpoints
//! - CORS support for browser-based clients
//! - Cache invalidation for the authentication service, on a separate
//!   internal router

pub mod documents;
pub mod health;
pub mod invalidation;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::post,
    Router,
};
use docstore_storage::ContentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::invalidation::INVALIDATE_PATH;
use crate::state::AppState;

/// Build the CORS layer from configuration.
///
/// An empty origin list allows any origin.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            header::CONTENT_LENGTH,
            header::LAST_MODIFIED,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        if config.is_production() {
            tracing::warn!("CORS: allowing all origins in production; set DOCSTORE_CORS_ORIGINS");
        } else {
            tracing::info!("CORS: allowing all origins");
        }
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Create the public application router.
///
/// - Document routes at /api/v1/docs
/// - Health checks at /health/*
pub fn create_router<S: ContentStore + 'static>(state: Arc<AppState<S>>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let cors = build_cors_layer(&state.config);

    Router::new()
        .nest("/api/v1/docs", documents::create_router::<S>())
        .nest("/health", health::create_router::<S>())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Create the router for the internal listener.
///
/// Carries cache invalidation at /internal/v1/cache/invalidate, which has no
/// token check and must only be reachable by the authentication service.
pub fn create_internal_router<S: ContentStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route(INVALIDATE_PATH, post(invalidation::invalidate_identity::<S>))
        .nest("/health", health::create_router::<S>())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
