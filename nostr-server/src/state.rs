//! Shared application state wired together in `main` and threaded through
//! axum's `State` extractor.

use crate::auth::Authenticator;
use crate::ingest::IngestPipeline;
use crate::metrics::Metrics;
use crate::session_registry::SessionRegistry;
use nostr_core::config::RelayConfig;
use nostr_storage::{IndexedCache, MessageBus};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub cache: Arc<IndexedCache>,
    pub bus: Arc<MessageBus>,
    pub registry: Arc<SessionRegistry>,
    pub authenticator: Arc<Authenticator>,
    pub ingest: Arc<IngestPipeline>,
    pub metrics: Arc<Metrics>,
}
