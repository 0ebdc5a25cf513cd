//! Shared application state

use std::sync::Arc;
use std::time::Instant;

use docstore_storage::{ContentStore, DocumentService};

use crate::config::ApiConfig;
use crate::gateway::UsersGateway;

/// State handed to every handler.
pub struct AppState<S: ContentStore> {
    pub docs: DocumentService<S>,
    pub users: Arc<dyn UsersGateway>,
    pub config: ApiConfig,
    pub start_time: Instant,
}

impl<S: ContentStore> AppState<S> {
    pub fn new(docs: DocumentService<S>, users: Arc<dyn UsersGateway>, config: ApiConfig) -> Self {
        Self {
            docs,
            users,
            config,
            start_time: Instant::now(),
        }
    }
}
