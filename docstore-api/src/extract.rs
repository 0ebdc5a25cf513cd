//! Request extractors
//!
//! - [`RequestToken`]: the caller's token, if any, from `Authorization: Bearer`
//!   or the `token` query parameter.
//! - [`AuthIdentity`]: the identity the users service resolved that token to.
//!   Handlers taking it are authenticated by type.
//! - [`DocumentPath`]: a typed document id from the `:id` path segment.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query},
    http::{header, request::Parts},
};
use docstore_core::DocumentId;
use docstore_storage::ContentStore;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Find the caller's token. The header wins over the query string.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|token| !token.is_empty())
}

// ============================================================================
// TOKEN
// ============================================================================

/// Token supplied with the request, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for RequestToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestToken(token_from_parts(parts)))
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Authenticated caller identity (login).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<Arc<AppState<S>>> for AuthIdentity
where
    S: ContentStore + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or_else(|| ApiError::missing_field("token"))?;
        let login = state.users.auth(&token).await?;
        Ok(AuthIdentity(login))
    }
}

// ============================================================================
// PATH
// ============================================================================

/// Document id taken from the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentPath(pub DocumentId);

#[async_trait]
impl<S> FromRequestParts<S> for DocumentPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_format("id", &format!("path segment: {}", e)))?;
        let id: DocumentId = raw.parse()?;
        Ok(DocumentPath(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_token_from_bearer_header() {
        let p = parts("/api/v1/docs", Some("Bearer abc"));
        assert_eq!(token_from_parts(&p), Some("abc".to_string()));
    }

    #[test]
    fn test_token_from_query() {
        let p = parts("/api/v1/docs?key=name&token=xyz", None);
        assert_eq!(token_from_parts(&p), Some("xyz".to_string()));
    }

    #[test]
    fn test_header_wins_over_query() {
        let p = parts("/api/v1/docs?token=query", Some("Bearer header"));
        assert_eq!(token_from_parts(&p), Some("header".to_string()));
    }

    #[test]
    fn test_missing_or_empty_token() {
        assert_eq!(token_from_parts(&parts("/", None)), None);
        assert_eq!(token_from_parts(&parts("/?token=", None)), None);
        assert_eq!(token_from_parts(&parts("/", Some("Basic Zm9vOmJhcg=="))), None);
    }
}
