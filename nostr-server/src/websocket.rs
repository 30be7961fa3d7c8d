//! The Frame Session handler: one axum WebSocket upgrade per
//! connection, split into a send task draining a bounded per-session
//! channel and a receive task parsing inbound frames.

use crate::fanout::{privacy_allows, quarantine_allows};
use crate::frame::{ClientFrame, ServerFrame};
use crate::ingest::IngestOutcome;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use nostr_core::{Error, EventOrigin};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const OUTBOUND_BUFFER: usize = 256;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);

    if let Err(e) = state.registry.register(session_id.clone(), tx) {
        warn!(session = %session_id, error = %e, "rejecting connection");
        return;
    }
    state.metrics.increment_connections().await;
    info!(session = %session_id, "session opened");

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match frame.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("failed to serialize outbound frame: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_session = session_id.clone();
    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    handle_frame(&text, &recv_session, &recv_state).await;
                }
                Ok(Message::Binary(_)) => {
                    send_notice(&recv_state, &recv_session, "binary frames are not supported").await;
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    debug!(session = %recv_session, error = %e, "transport error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.registry.unregister(&session_id);
    state.authenticator.deauthenticate(&session_id).await;
    state.metrics.decrement_connections().await;
    info!(session = %session_id, "session closed");
}

async fn send_notice(state: &AppState, session_id: &str, text: &str) {
    state
        .registry
        .send_to(&session_id.to_string(), ServerFrame::notice(text))
        .await;
}

async fn handle_frame(text: &str, session_id: &str, state: &AppState) {
    state.registry.update_activity(&session_id.to_string());

    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            send_notice(state, session_id, &e.to_string()).await;
            return;
        }
    };

    match frame {
        ClientFrame::Req {
            subscription_id,
            filters,
        } => handle_req(session_id, subscription_id, filters, state).await,
        ClientFrame::Event(event) => handle_event(session_id, event, state).await,
        ClientFrame::Close { subscription_id } => {
            state
                .registry
                .unsubscribe(&session_id.to_string(), &subscription_id);
        }
    }
}

/// Backfill in `created_at` descending order, then `EOSE`, then this
/// subscription starts receiving live fan-out matches. The
/// subscription is only registered with the fan-out loop once backfill
/// and `EOSE` have already been sent, so a concurrently fanned-out event
/// can never reach this session ahead of its own backfill.
async fn handle_req(
    session_id: &str,
    subscription_id: String,
    filters: Vec<nostr_core::Filter>,
    state: &AppState,
) {
    let pubkey = state.registry.pubkey_of(&session_id.to_string());
    let admins: std::collections::HashSet<nostr_core::PubKey> = state
        .config
        .access
        .admins
        .iter()
        .map(|s| nostr_core::PubKey(s.clone()))
        .collect();

    for filter in &filters {
        for event in state.cache.query(filter) {
            if !privacy_allows(&event, pubkey.as_ref()) || !quarantine_allows(&event, pubkey.as_ref(), &admins) {
                continue;
            }
            let frame = ServerFrame::event(subscription_id.clone(), event);
            if !state.registry.send_to(&session_id.to_string(), frame).await {
                return;
            }
        }
    }

    if !state
        .registry
        .send_to(&session_id.to_string(), ServerFrame::eose(subscription_id.clone()))
        .await
    {
        return;
    }

    if let Err(e) = state.registry.subscribe(&session_id.to_string(), subscription_id, filters) {
        send_notice(state, session_id, &e).await;
    }
}

async fn handle_event(session_id: &str, event: nostr_core::Event, state: &AppState) {
    let event_id = event.id.clone();
    let pubkey = event.pubkey.clone();
    let outcome = state.ingest.ingest(event, EventOrigin::Published).await;

    let frame = match outcome {
        Ok(IngestOutcome::Accepted) => {
            if state.registry.pubkey_of(&session_id.to_string()).is_none() {
                state.registry.set_authenticated(&session_id.to_string(), pubkey);
            }
            ServerFrame::ok(event_id.0, true, "")
        }
        Ok(IngestOutcome::Duplicate) => ServerFrame::ok(event_id.0, true, "duplicate"),
        Ok(IngestOutcome::Quarantined(reason)) => {
            ServerFrame::ok(event_id.0, true, format!("quarantined: {reason}"))
        }
        Err(Error::Validation(reason)) => ServerFrame::ok(event_id.0, false, format!("invalid: {reason}")),
        Err(Error::Restricted(reason)) => {
            ServerFrame::ok(event_id.0, false, format!("restricted: {reason}"))
        }
        Err(Error::Transient) => ServerFrame::ok(event_id.0, false, "error: busy"),
        Err(e) => {
            error!(error = %e, "unexpected ingest error");
            ServerFrame::notice("internal error")
        }
    };

    state.registry.send_to(&session_id.to_string(), frame).await;
}
