//! Cache invalidation endpoint
//!
//! `POST /internal/v1/cache/invalidate` drops every cached access entry of an
//! identity. Called by the authentication service after a session ends.
//! Repeated or duplicate deliveries are harmless.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use docstore_storage::ContentStore;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::invalidation::InvalidateRequest;
use crate::state::AppState;

/// POST /internal/v1/cache/invalidate
pub async fn invalidate_identity<S: ContentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<InvalidateRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(req) = body.map_err(|e| ApiError::invalid_input(e.body_text()))?;

    let identity = req.identity.trim();
    if identity.is_empty() {
        return Err(ApiError::missing_field("identity"));
    }

    state.docs.invalidate_identity(identity);
    Ok(StatusCode::NO_CONTENT)
}
