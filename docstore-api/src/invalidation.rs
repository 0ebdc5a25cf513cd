//! Invalidation client
//!
//! Used by the authentication service to tell a docstore instance that an
//! identity's session ended, so its cached access entries can be dropped.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{ApiError, ApiResult};

/// Path of the invalidation endpoint on a docstore instance.
pub const INVALIDATE_PATH: &str = "/internal/v1/cache/invalidate";

/// Body of an invalidation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateRequest {
    pub identity: String,
}

/// HTTP client for the invalidation endpoint.
#[derive(Debug, Clone)]
pub struct InvalidationClient {
    client: reqwest::Client,
    endpoint: String,
}

impl InvalidationClient {
    /// Create a client for the docstore instance at `base_url`.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), INVALIDATE_PATH),
        })
    }

    /// Create a client from `DOCSTORE_INVALIDATION_URL`.
    pub fn from_env() -> ApiResult<Self> {
        let base_url = std::env::var("DOCSTORE_INVALIDATION_URL")
            .unwrap_or_else(|_| "http://localhost:3100".to_string());
        Self::new(&base_url)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask the docstore to evict every cached entry of `identity`.
    pub async fn invalidate_identity(&self, identity: &str) -> ApiResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&InvalidateRequest {
                identity: identity.to_string(),
            })
            .send()
            .await
            .map_err(|e| ApiError::upstream_unavailable(format!("Invalidation failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(identity = %identity, "Identity invalidation delivered");
            Ok(())
        } else if status.is_client_error() {
            Err(ApiError::invalid_input(format!(
                "Invalidation rejected with {}",
                status
            )))
        } else {
            Err(ApiError::upstream_unavailable(format!(
                "Invalidation failed with {}",
                status
            )))
        }
    }

    /// Fire-and-forget variant of [`invalidate_identity`](Self::invalidate_identity).
    ///
    /// Must be called from within a Tokio runtime. Failures are logged and
    /// otherwise ignored. The handle may be dropped; awaiting it only waits
    /// for the attempt to finish.
    pub fn notify_identity(&self, identity: impl Into<String>) -> JoinHandle<()> {
        let client = self.clone();
        let identity = identity.into();
        tokio::spawn(async move {
            if let Err(e) = client.invalidate_identity(&identity).await {
                tracing::warn!(
                    identity = %identity,
                    error = %e.message,
                    "Identity invalidation failed"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = InvalidationClient::new("http://docs:3000/").unwrap();
        assert_eq!(
            client.endpoint(),
            "http://docs:3000/internal/v1/cache/invalidate"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(InvalidateRequest {
            identity: "bob".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "identity": "bob" }));
    }
}
