//! The REST surface: event queries, one-shot publish, health and
//! stats, and the NIP-42 challenge/auth pair. Everything here is
//! stateless across requests; `X-Nostr-Pubkey` plus a prior
//! `/nostr/auth` is what carries identity from one request to the next.

use crate::fanout::{privacy_allows, quarantine_allows};
use crate::ingest::IngestOutcome;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use nostr_core::{Error, Event, EventOrigin, Filter, PubKey};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Builds the REST routes against `AppState`. Left unstated so callers
/// can `.merge()` this with other routers sharing the same state type
/// before calling `.with_state()` once, at the top.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/events", get(list_events_handler).post(query_events_handler))
        .route("/publish", post(publish_handler))
        .route("/nostr/challenge", get(challenge_handler))
        .route("/nostr/auth", post(auth_handler))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: u64,
    version: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Json(HealthResponse {
        status: "healthy",
        timestamp,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    metrics: crate::metrics::MetricsSnapshot,
    bus: nostr_storage::BusStats,
    cached_events: usize,
    sessions: usize,
    subscriptions: usize,
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = StatsResponse {
        metrics: state.metrics.snapshot().await,
        bus: state.bus.stats().await,
        cached_events: state.cache.len(),
        sessions: state.registry.session_count(),
        subscriptions: state.registry.subscription_count(),
    };
    Json(snapshot)
}

/// Query params accepted by `GET /events`: repeated `authors`/`kinds`/`tag`
/// is awkward over a flat query string, so multi-valued fields take a
/// single comma-separated value, matching the `#p=abc,def` shorthand
/// clients already use for filter tags.
#[derive(Debug, Deserialize)]
struct EventsQuery {
    authors: Option<String>,
    kinds: Option<String>,
    ids: Option<String>,
    since: Option<i64>,
    until: Option<i64>,
    limit: Option<usize>,
}

fn filter_from_query(params: EventsQuery) -> Filter {
    let mut filter = Filter::default();
    if let Some(authors) = params.authors {
        filter.authors = Some(authors.split(',').map(nostr_core::PubKey::from).collect());
    }
    if let Some(ids) = params.ids {
        filter.ids = Some(ids.split(',').map(nostr_core::EventId::from).collect());
    }
    if let Some(kinds) = params.kinds {
        filter.kinds = Some(kinds.split(',').filter_map(|s| s.parse().ok()).collect());
    }
    filter.since = params.since;
    filter.until = params.until;
    filter.limit = params.limit;
    filter
}

async fn list_events_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EventsQuery>,
) -> impl IntoResponse {
    if !read_allowed(&headers, &state).await {
        return error_response(StatusCode::FORBIDDEN, "RESTRICTED", "read access requires authentication");
    }
    let filter = filter_from_query(params);
    let events = visible_events(&state, &filter, claimed_pubkey(&headers).as_ref());
    Json(serde_json::json!({ "success": true, "data": events })).into_response()
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    filter: Filter,
}

async fn query_events_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    if !read_allowed(&headers, &state).await {
        return error_response(StatusCode::FORBIDDEN, "RESTRICTED", "read access requires authentication");
    }
    let events = visible_events(&state, &request.filter, claimed_pubkey(&headers).as_ref());
    Json(serde_json::json!({ "success": true, "data": events })).into_response()
}

/// Queries the cache and drops anything the caller isn't privy to: directed
/// messages and encrypted envelopes addressed to someone else, and
/// quarantined events for non-admin, non-author readers.
fn visible_events(state: &AppState, filter: &Filter, pubkey: Option<&PubKey>) -> Vec<Event> {
    let admins: std::collections::HashSet<PubKey> =
        state.config.access.admins.iter().map(|s| PubKey(s.clone())).collect();
    state
        .cache
        .query(filter)
        .into_iter()
        .filter(|event| privacy_allows(event, pubkey) && quarantine_allows(event, pubkey, &admins))
        .collect()
}

/// `X-Nostr-Pubkey` plus an active verified session (from a prior
/// `/nostr/auth` call) is how `public_read = false` relays recognize a
/// returning caller over otherwise-stateless REST requests.
async fn read_allowed(headers: &HeaderMap, state: &AppState) -> bool {
    if state.config.access.public_read {
        return true;
    }
    let Some(pubkey) = claimed_pubkey(headers) else {
        return false;
    };
    if !state.authenticator.is_authenticated(&pubkey).await {
        return false;
    }
    let admins: std::collections::HashSet<PubKey> =
        state.config.access.admins.iter().map(|s| PubKey(s.clone())).collect();
    state.authenticator.can_read(Some(&pubkey), &admins, state.config.access.public_read)
}

fn claimed_pubkey(headers: &HeaderMap) -> Option<PubKey> {
    headers.get("X-Nostr-Pubkey").and_then(|v| v.to_str().ok()).map(PubKey::from)
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    event: Event,
}

/// Submits an event the same way a `["EVENT", ...]` websocket frame
/// would, for clients that would rather speak plain HTTP.
async fn publish_handler(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> impl IntoResponse {
    let event_id = request.event.id.clone();
    match state.ingest.ingest(request.event, EventOrigin::Published).await {
        Ok(IngestOutcome::Accepted) => {
            Json(serde_json::json!({ "success": true, "data": { "id": event_id.0, "status": "accepted" } }))
                .into_response()
        }
        Ok(IngestOutcome::Duplicate) => {
            Json(serde_json::json!({ "success": true, "data": { "id": event_id.0, "status": "duplicate" } }))
                .into_response()
        }
        Ok(IngestOutcome::Quarantined(reason)) => Json(serde_json::json!({
            "success": true,
            "data": { "id": event_id.0, "status": "quarantined", "reason": reason },
        }))
        .into_response(),
        Err(Error::Validation(reason)) => error_response(StatusCode::BAD_REQUEST, "INVALID", reason),
        Err(Error::Restricted(reason)) => error_response(StatusCode::FORBIDDEN, "RESTRICTED", reason),
        Err(Error::Transient) => error_response(StatusCode::SERVICE_UNAVAILABLE, "BUSY", "relay is busy, retry shortly"),
        Err(e) => {
            error!(error = %e, "unexpected publish error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "internal error")
        }
    }
}

#[derive(Debug, Serialize)]
struct ChallengeResponse {
    challenge: String,
    relay: String,
}

async fn challenge_handler(State(state): State<AppState>) -> impl IntoResponse {
    let challenge = state.authenticator.challenge().await;
    Json(ChallengeResponse {
        challenge,
        relay: state.authenticator.relay_url().to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    event: Event,
}

async fn auth_handler(State(state): State<AppState>, Json(request): Json<AuthRequest>) -> impl IntoResponse {
    match state.authenticator.verify(&request.event).await {
        Ok(pubkey) => Json(serde_json::json!({ "success": true, "data": { "pubkey": pubkey.0 } })).into_response(),
        Err(reason) => {
            warn!(reason, "nostr auth verification failed");
            error_response(StatusCode::UNAUTHORIZED, "AUTH_FAILED", reason)
        }
    }
}

