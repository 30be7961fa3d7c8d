use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use nostr_core::config::RelayConfig;
use nostr_core::kinds::CONTACT_LIST;
use nostr_core::{Event, Filter, PubKey};
use nostr_server::auth::{AdminFollowListSource, Authenticator};
use nostr_server::fanout;
use nostr_server::http;
use nostr_server::ingest::IngestPipeline;
use nostr_server::metrics::Metrics;
use nostr_server::session_registry::{SessionRegistry, SessionRegistryConfig};
use nostr_server::state::AppState;
use nostr_server::topics;
use nostr_server::websocket::websocket_handler;
use nostr_storage::{IndexedCache, MessageBus};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::info;

struct CacheFollowListSource {
    cache: Arc<IndexedCache>,
}

#[async_trait]
impl AdminFollowListSource for CacheFollowListSource {
    async fn fetch_contact_list(&self, admin: &PubKey) -> Option<Event> {
        let mut filter = Filter::default();
        filter.authors = Some([admin.clone()].into_iter().collect());
        filter.kinds = Some([CONTACT_LIST].into_iter().collect());
        filter.limit = Some(1);
        self.cache.query(&filter).into_iter().next()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("starting nostr relay");

    let config = Arc::new(RelayConfig::default());

    info!("initializing indexed cache...");
    let cache = Arc::new(IndexedCache::new(config.retention.event_ttl));

    info!("initializing message bus...");
    let bus = Arc::new(MessageBus::new(
        config.retention.queue_message_ttl,
        config.retention.queue_max_depth,
    ));

    info!("initializing authenticator...");
    let authenticator = Arc::new(Authenticator::new(
        config.auth.challenge_ttl,
        config.auth.auth_session_ttl,
        config.auth.whitelist_positive_ttl,
        config.auth.whitelist_negative_ttl,
        config.access.relay_url.clone(),
    ));

    info!("initializing session registry...");
    let registry = Arc::new(SessionRegistry::new(SessionRegistryConfig::default()));

    info!("initializing metrics...");
    let metrics = Arc::new(Metrics::new());

    info!("initializing ingest pipeline...");
    let ingest = Arc::new(IngestPipeline::new(
        bus.clone(),
        cache.clone(),
        authenticator.clone(),
        metrics.clone(),
        config.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        cache: cache.clone(),
        bus: bus.clone(),
        registry: registry.clone(),
        authenticator: authenticator.clone(),
        ingest,
        metrics,
    };

    let shutdown = CancellationToken::new();

    info!("starting fan-out consumer...");
    let admins: std::collections::HashSet<PubKey> =
        config.access.admins.iter().map(|s| PubKey(s.clone())).collect();
    let fanout_handle = tokio::spawn(fanout::run(
        bus.clone(),
        cache.clone(),
        registry.clone(),
        config.ingest.replaceable_kinds.clone(),
        admins,
        shutdown.clone(),
    ));

    info!("starting whitelist refresh loop...");
    let whitelist_handle = tokio::spawn(whitelist_refresh_loop(
        authenticator.clone(),
        cache.clone(),
        config.clone(),
        shutdown.clone(),
    ));

    info!("starting moderation queue consumer...");
    let moderation_handle = tokio::spawn(topics::run_moderation_consumer(bus.clone(), shutdown.clone()));

    let app: Router<()> = Router::new()
        .route(&config.network.ws_path, get(websocket_handler))
        .merge(http::router())
        .with_state(state)
        .layer(ServiceBuilder::new().layer(CompressionLayer::new()).layer(CorsLayer::permissive()));

    let addr: std::net::SocketAddr = config.network.bind_addr.parse()?;
    info!(%addr, "binding http/websocket listener");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown(shutdown.clone()));

    info!("nostr relay is ready");
    server.await?;

    info!(grace = ?config.shutdown_grace, "shutting down, draining background tasks");
    shutdown.cancel();
    let _ = tokio::time::timeout(config.shutdown_grace, async {
        let _ = fanout_handle.await;
        let _ = whitelist_handle.await;
        let _ = moderation_handle.await;
    })
    .await;

    info!("nostr relay stopped");
    Ok(())
}

async fn whitelist_refresh_loop(
    authenticator: Arc<Authenticator>,
    cache: Arc<IndexedCache>,
    config: Arc<RelayConfig>,
    shutdown: CancellationToken,
) {
    if config.access.admins.is_empty() {
        return;
    }
    let source = CacheFollowListSource { cache };
    let admins: std::collections::HashSet<PubKey> =
        config.access.admins.iter().map(|s| PubKey(s.clone())).collect();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.auth.whitelist_refresh_interval) => {}
            _ = shutdown.cancelled() => break,
        }
        authenticator
            .refresh_whitelist(&source, &admins, config.access.whitelist_merge_mode)
            .await;
        info!("whitelist refreshed from admin follow lists");
    }
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    info!("shutdown signal received");
}
