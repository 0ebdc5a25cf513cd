//! Document REST API Routes
//!
//! Mounted under `/api/v1/docs`:
//! - `POST /`: multipart upload (`meta`, then `file` or `json`)
//! - `GET /?key&value&limit[&login]`: filtered listing
//! - `GET /:id`: document body
//! - `HEAD /:id`: document headers only
//! - `DELETE /:id`: delete (owner only)

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docstore_core::{AccessorKind, DocumentDraft, DocumentId, DocumentMeta};
use docstore_storage::{ContentSink, ContentSource, ContentStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{AuthIdentity, DocumentPath, RequestToken};
use crate::state::AppState;

const OCTET_STREAM: &str = "application/octet-stream";
const APPLICATION_JSON: &str = "application/json";
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// ============================================================================
// TYPES
// ============================================================================

/// The `meta` part of an upload: the draft plus an optional token.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadMeta {
    #[serde(flatten)]
    pub draft: DocumentDraft,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub id: DocumentId,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub key: Option<String>,
    pub value: Option<String>,
    pub limit: Option<String>,
    pub login: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub docs: Vec<DocumentMeta>,
}

#[derive(Debug, Default)]
struct UploadParts {
    meta: Option<UploadMeta>,
    file: Option<Bytes>,
    file_name: Option<String>,
    file_mime: Option<String>,
    json: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/v1/docs - Save a document
pub async fn save_document<S: ContentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestToken(token): RequestToken,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let limit = state.config.max_upload_bytes;
    let parts = read_upload(multipart, limit).await?;

    let meta = parts.meta.ok_or_else(|| ApiError::missing_field("meta"))?;
    let token = token
        .or(meta.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::missing_field("token"))?;
    let owner = state.users.auth(&token).await?;

    let mut draft = meta.draft;
    let saved = if draft.is_file {
        let bytes = parts.file.ok_or_else(|| ApiError::missing_field("file"))?;
        if draft.name.is_empty() {
            draft.name = parts.file_name.unwrap_or_default();
        }
        if draft.mime.is_empty() {
            draft.mime = parts.file_mime.unwrap_or_default();
        }
        if draft.name.is_empty() {
            return Err(ApiError::missing_field("name"));
        }

        let mut reader: &[u8] = &bytes;
        let source: ContentSource<'_> = &mut reader;
        state
            .docs
            .save_document(&owner, Some(source), None, draft)
            .await?
    } else {
        let json = parts.json.ok_or_else(|| ApiError::missing_field("json"))?;
        serde_json::from_str::<serde_json::Value>(&json)?;
        if draft.name.is_empty() {
            return Err(ApiError::missing_field("name"));
        }
        state
            .docs
            .save_document(&owner, None, Some(json.as_bytes()), draft)
            .await?
    };

    Ok((
        StatusCode::OK,
        Json(SaveResponse {
            id: saved.id,
            name: saved.name,
        }),
    ))
}

/// GET /api/v1/docs - List documents
///
/// Without `login` the caller's own documents are listed. With `login` set to
/// the caller, the documents shared with the caller are listed.
pub async fn list_documents<S: ContentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthIdentity(identity): AuthIdentity,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let key = params.key.ok_or_else(|| ApiError::missing_field("key"))?;
    let value = params.value.ok_or_else(|| ApiError::missing_field("value"))?;
    let limit = parse_limit(params.limit.as_deref())?;

    let kind = match params.login {
        None => AccessorKind::Owner,
        Some(login) if login == identity => AccessorKind::Grantee,
        Some(_) => return Err(ApiError::forbidden("Cannot list another identity's documents")),
    };

    let docs = state
        .docs
        .list_documents(kind, &identity, &key, &value, limit)
        .await?;

    Ok(Json(ListResponse { docs }))
}

/// GET /api/v1/docs/:id - Document body
///
/// File bodies are buffered before the response starts so a failed copy can
/// still be reported with a proper status.
pub async fn get_document<S: ContentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthIdentity(identity): AuthIdentity,
    DocumentPath(id): DocumentPath,
) -> ApiResult<Response> {
    let meta = state.docs.get_document_metadata(id, &identity).await?;

    if meta.is_file {
        let content_ref = meta
            .content_ref
            .ok_or_else(|| ApiError::internal_error("File document has no content"))?;

        let mut body: Vec<u8> = Vec::with_capacity(usize::try_from(meta.size).unwrap_or(0));
        let sink: ContentSink<'_> = &mut body;
        let copied = state.docs.read_document_content(content_ref, sink).await?;

        let headers = document_headers(&meta, copied);
        Ok((StatusCode::OK, headers, body).into_response())
    } else {
        let payload = state.docs.read_document_payload(id).await?;
        let headers = document_headers(&meta, payload.len() as u64);
        Ok((StatusCode::OK, headers, payload).into_response())
    }
}

/// HEAD /api/v1/docs/:id - Document headers
pub async fn head_document<S: ContentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthIdentity(identity): AuthIdentity,
    DocumentPath(id): DocumentPath,
) -> ApiResult<Response> {
    let meta = state.docs.get_document_metadata(id, &identity).await?;
    let headers = document_headers(&meta, u64::try_from(meta.size).unwrap_or(0));
    Ok((StatusCode::OK, headers).into_response())
}

/// DELETE /api/v1/docs/:id - Delete a document
pub async fn delete_document<S: ContentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthIdentity(identity): AuthIdentity,
    DocumentPath(id): DocumentPath,
) -> ApiResult<impl IntoResponse> {
    let meta = state.docs.get_document_metadata(id, &identity).await?;
    if meta.owner != identity {
        return Err(ApiError::forbidden("Only the owner may delete a document"));
    }

    state.docs.delete_document(id).await?;

    let mut body = HashMap::with_capacity(1);
    body.insert(id.to_string(), true);
    Ok(Json(body))
}

// ============================================================================
// HELPERS
// ============================================================================

async fn read_upload(mut multipart: Multipart, limit: usize) -> ApiResult<UploadParts> {
    let mut parts = UploadParts::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("meta") => {
                let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                parts.meta = Some(serde_json::from_str(&text)?);
            }
            Some("file") => {
                parts.file_name = field.file_name().map(str::to_owned);
                parts.file_mime = field.content_type().map(str::to_owned);
                parts.file = Some(field.bytes().await.map_err(|e| multipart_error(e, limit))?);
            }
            Some("json") => {
                parts.json = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(parts)
}

fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(limit)
    } else {
        ApiError::invalid_input(format!("Malformed multipart body: {}", err.body_text()))
    }
}

fn parse_limit(raw: Option<&str>) -> ApiResult<usize> {
    let raw = raw.ok_or_else(|| ApiError::missing_field("limit"))?;
    match raw.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(ApiError::invalid_format("limit", "positive integer")),
    }
}

/// Response headers describing `meta`'s body.
pub fn document_headers(meta: &DocumentMeta, content_length: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let content_type = if !meta.is_file {
        HeaderValue::from_static(APPLICATION_JSON)
    } else if meta.mime.is_empty() {
        HeaderValue::from_static(OCTET_STREAM)
    } else {
        HeaderValue::from_str(&meta.mime).unwrap_or(HeaderValue::from_static(OCTET_STREAM))
    };
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    let modified = meta.created_at.format(HTTP_DATE_FORMAT).to_string();
    if let Ok(value) = HeaderValue::from_str(&modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if meta.is_file {
        let disposition = format!(
            "attachment; filename*=UTF-8''{}",
            urlencoding::encode(&meta.name)
        );
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }

    headers
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the document router.
pub fn create_router<S: ContentStore + 'static>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", post(save_document::<S>).get(list_documents::<S>))
        .route(
            "/:id",
            get(get_document::<S>)
                .head(head_document::<S>)
                .delete(delete_document::<S>),
        )
}
