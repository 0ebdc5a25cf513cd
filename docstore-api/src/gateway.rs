//! Users service gateway
//!
//! Resolves bearer tokens to identities (logins). The docstore never mints or
//! validates tokens itself; it asks the users service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Token to identity resolution.
#[async_trait]
pub trait UsersGateway: Send + Sync {
    /// Resolve `token` to the login it was issued for.
    async fn auth(&self, token: &str) -> ApiResult<String>;
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    login: String,
}

// ============================================================================
// HTTP GATEWAY
// ============================================================================

/// Gateway talking to the users service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUsersGateway {
    client: reqwest::Client,
    auth_url: String,
}

impl HttpUsersGateway {
    pub fn new(users_url: &str) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            auth_url: format!("{}/api/v1/auth", users_url.trim_end_matches('/')),
        })
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }
}

#[async_trait]
impl UsersGateway for HttpUsersGateway {
    async fn auth(&self, token: &str) -> ApiResult<String> {
        let response = self
            .client
            .post(&self.auth_url)
            .json(&AuthRequest { token })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, url = %self.auth_url, "Users service unreachable");
                ApiError::upstream_unavailable("Users service unavailable")
            })?;

        let status = response.status();
        if matches!(status.as_u16(), 401 | 403 | 404) {
            return Err(ApiError::invalid_token("Token rejected by users service"));
        }
        if !status.is_success() {
            tracing::warn!(status = %status, "Users service returned an error");
            return Err(ApiError::upstream_unavailable(format!(
                "Users service returned {}",
                status
            )));
        }

        let body: AuthResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Malformed users service response");
            ApiError::upstream_unavailable("Malformed users service response")
        })?;

        if body.login.is_empty() {
            return Err(ApiError::unauthorized("Token does not resolve to a login"));
        }
        Ok(body.login)
    }
}

// ============================================================================
// STATIC GATEWAY
// ============================================================================

/// Fixed token table, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticUsersGateway {
    tokens: HashMap<String, String>,
}

impl StaticUsersGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as belonging to `login`.
    pub fn with_token(mut self, token: impl Into<String>, login: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), login.into());
        self
    }
}

#[async_trait]
impl UsersGateway for StaticUsersGateway {
    async fn auth(&self, token: &str) -> ApiResult<String> {
        match self.tokens.get(token) {
            Some(login) if !login.is_empty() => Ok(login.clone()),
            Some(_) => Err(ApiError::unauthorized("Token does not resolve to a login")),
            None => Err(ApiError::invalid_token("Unknown token")),
        }
    }
}
