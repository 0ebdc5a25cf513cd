//! Docstore API Server Entry Point
//!
//! Bootstraps configuration, prepares the schema and starts the Axum HTTP
//! servers: the public API and the internal invalidation listener.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use docstore_api::telemetry::init_tracing;
use docstore_api::{
    create_internal_router, create_router, ApiConfig, ApiError, ApiResult, AppState, DbConfig,
    HttpUsersGateway, PgContentStore,
};
use docstore_storage::DocumentService;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let api_config = ApiConfig::from_env();
    init_tracing(&api_config)?;

    let db_config = DbConfig::from_env();
    let store = PgContentStore::from_config(&db_config)?;
    store.migrate().await?;

    let users = Arc::new(HttpUsersGateway::new(&api_config.users_url)?);
    let docs = DocumentService::new(Arc::new(store));

    let addr = api_config.bind_addr()?;
    let internal_addr = api_config.internal_bind_addr()?;
    let shutdown_timeout = api_config.shutdown_timeout;
    let state = Arc::new(AppState::new(docs, users, api_config));
    let app = create_router(Arc::clone(&state));
    let internal_app = create_internal_router(state);

    tracing::info!(
        %addr,
        %internal_addr,
        table = %db_config.table,
        "Starting docstore API server"
    );

    let listener = bind(addr).await?;
    let internal_listener = bind(internal_addr).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        let public = axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown_rx.clone()))
            .into_future();
        let internal = axum::serve(internal_listener, internal_app)
            .with_graceful_shutdown(wait_for(shutdown_rx))
            .into_future();
        tokio::try_join!(public, internal)
    });

    tokio::select! {
        joined = &mut server => {
            joined
                .map_err(|e| ApiError::internal_error(format!("Server task failed: {}", e)))?
                .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            if tokio::time::timeout(shutdown_timeout, &mut server).await.is_err() {
                tracing::warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Graceful shutdown timed out"
                );
            }
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn bind(addr: SocketAddr) -> ApiResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))
}

/// Resolve once shutdown is signalled or the sender is gone.
async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
