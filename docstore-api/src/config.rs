//! API Configuration Module
//!
//! Server, upload, CORS and logging settings. Configuration is loaded from
//! environment variables with sensible defaults for development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 << 20;

// ============================================================================
// LOG FORMAT
// ============================================================================

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the HTTP server and its collaborators.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// Port to bind.
    pub port: u16,

    /// Interface for the internal listener serving cache invalidation.
    pub internal_bind_host: String,

    /// Port for the internal listener.
    pub internal_port: u16,

    /// Base URL of the users service that resolves tokens to identities.
    pub users_url: String,

    /// Largest accepted request body, multipart uploads included.
    pub max_upload_bytes: usize,

    /// Grace period for in-flight requests on shutdown.
    pub shutdown_timeout: Duration,

    /// Deployment environment (development, staging, production).
    pub environment: String,

    pub log_format: LogFormat,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            internal_bind_host: "127.0.0.1".to_string(),
            internal_port: 3100,
            users_url: "http://localhost:3001".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            shutdown_timeout: Duration::from_secs(10),
            environment: "development".to_string(),
            log_format: LogFormat::Json,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `DOCSTORE_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` or `DOCSTORE_API_PORT`: Port (default: 3000)
    /// - `DOCSTORE_INTERNAL_BIND`: Internal listener interface (default: 127.0.0.1)
    /// - `DOCSTORE_INTERNAL_PORT`: Internal listener port (default: 3100)
    /// - `DOCSTORE_USERS_URL`: Users service base URL
    /// - `DOCSTORE_MAX_UPLOAD_BYTES`: Upload limit (default: 10 MiB)
    /// - `DOCSTORE_SHUTDOWN_TIMEOUT_SECS`: Shutdown grace period (default: 10)
    /// - `DOCSTORE_ENVIRONMENT`: Deployment environment (default: development)
    /// - `DOCSTORE_LOG_FORMAT`: "json" or "pretty" (default: json)
    /// - `DOCSTORE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `DOCSTORE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("DOCSTORE_API_PORT").ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let cors_origins = std::env::var("DOCSTORE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_host: std::env::var("DOCSTORE_API_BIND").unwrap_or(defaults.bind_host),
            port,
            internal_bind_host: std::env::var("DOCSTORE_INTERNAL_BIND")
                .unwrap_or(defaults.internal_bind_host),
            internal_port: std::env::var("DOCSTORE_INTERNAL_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.internal_port),
            users_url: std::env::var("DOCSTORE_USERS_URL").unwrap_or(defaults.users_url),
            max_upload_bytes: std::env::var("DOCSTORE_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            shutdown_timeout: std::env::var("DOCSTORE_SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            environment: std::env::var("DOCSTORE_ENVIRONMENT").unwrap_or(defaults.environment),
            log_format: std::env::var("DOCSTORE_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_format),
            cors_origins,
            cors_max_age_secs: std::env::var("DOCSTORE_CORS_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
        }
    }

    /// Socket address of the public listener.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        socket_addr(&self.bind_host, self.port)
    }

    /// Socket address of the internal listener.
    pub fn internal_bind_addr(&self) -> ApiResult<SocketAddr> {
        socket_addr(&self.internal_bind_host, self.internal_port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn socket_addr(host: &str, port: u16) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.cors_origins.is_empty());
        assert!(!config.is_production());
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");

        let config = ApiConfig {
            bind_host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_internal_listener_defaults_to_loopback() {
        let config = ApiConfig::default();
        let addr = config.internal_bind_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 3100);
        assert_ne!(addr.port(), config.port);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
