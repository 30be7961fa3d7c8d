//! Per-topic consumer for the operator-facing kind-routed queues:
//! currently just the moderation topic, drained for visibility into
//! events that failed structural validation.

use nostr_storage::{MessageBus, RoutingKey};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Drains `kind.moderation`, logging each rejected event for operator
/// inspection, and acknowledges it so the dead-letter queue only
/// accumulates entries that outlive the configured message TTL.
pub async fn run_moderation_consumer(bus: Arc<MessageBus>, cancellation: CancellationToken) {
    loop {
        if cancellation.is_cancelled() {
            break;
        }

        let Some(entry) = bus.consume_by_kind(RoutingKey::Moderation).await else {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                _ = cancellation.cancelled() => break,
            }
            continue;
        };

        warn!(
            event_id = %entry.event.id,
            pubkey = %entry.event.pubkey,
            kind = entry.event.kind,
            "event failed structural validation, routed to moderation queue"
        );
        bus.ack_topic(RoutingKey::Moderation, &entry.event.id.0).await;
    }
}
