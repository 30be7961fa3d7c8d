//! The ingest pipeline: validation, access gate, quality scoring,
//! and routing into the message bus.

use crate::auth::Authenticator;
use crate::metrics::Metrics;
use crate::quality;
use nostr_core::config::RelayConfig;
use nostr_core::{crypto, Error, Event, EventOrigin, Result};
use nostr_storage::{IndexedCache, MessageBus, RoutingKey};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const ONE_YEAR_SECS: i64 = 365 * 24 * 3600;
const ONE_DAY_SECS: i64 = 24 * 3600;
const ONE_HOUR_SECS: i64 = 3600;
const FIVE_MIN_SECS: i64 = 5 * 60;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted,
    Duplicate,
    Quarantined(String),
}

pub struct IngestPipeline {
    bus: Arc<MessageBus>,
    cache: Arc<IndexedCache>,
    authenticator: Arc<Authenticator>,
    metrics: Arc<Metrics>,
    config: Arc<RelayConfig>,
}

impl IngestPipeline {
    pub fn new(
        bus: Arc<MessageBus>,
        cache: Arc<IndexedCache>,
        authenticator: Arc<Authenticator>,
        metrics: Arc<Metrics>,
        config: Arc<RelayConfig>,
    ) -> Self {
        Self {
            bus,
            cache,
            authenticator,
            metrics,
            config,
        }
    }

    /// Structural checks that, on failure, still route the event to
    /// `kind.moderation` for operator inspection instead of rejecting it.
    fn validate_structural(&self, event: &Event, origin: EventOrigin) -> std::result::Result<(), String> {
        if event.id.0.is_empty() || event.pubkey.0.is_empty() || event.sig.0.is_empty() {
            return Err("missing required field".to_string());
        }

        let now = now_unix();
        if event.created_at < now - ONE_YEAR_SECS || event.created_at > now + ONE_DAY_SECS {
            return Err("created_at outside broad acceptance window".to_string());
        }

        if event.kind > 65_535 {
            return Err("kind out of range".to_string());
        }

        if event.content.len() > self.config.ingest.max_content_bytes {
            return Err("content too long".to_string());
        }

        if origin == EventOrigin::Published
            && (event.created_at < now - ONE_HOUR_SECS || event.created_at > now + FIVE_MIN_SECS)
        {
            return Err("created_at outside local submission window".to_string());
        }

        Ok(())
    }

    /// Accept a candidate event, route it, and report the outcome the
    /// caller should translate into an `OK` frame.
    pub async fn ingest(&self, event: Event, origin: EventOrigin) -> Result<IngestOutcome> {
        if let Err(reason) = self.validate_structural(&event, origin) {
            let _ = self
                .bus
                .publish(event.clone(), RoutingKey::Moderation)
                .await;
            self.metrics.record_rejected().await;
            debug!(event_id = %event.id, reason, "event failed structural validation");
            return Err(Error::Validation(reason));
        }

        if !crypto::verify_signature(&event) {
            self.metrics.record_rejected().await;
            return Err(Error::Validation("signature verification failed".to_string()));
        }

        if self.cache.get(&event.id).is_some() {
            return Ok(IngestOutcome::Duplicate);
        }

        let admins: std::collections::HashSet<nostr_core::PubKey> = self
            .config
            .access
            .admins
            .iter()
            .map(|s| nostr_core::PubKey(s.clone()))
            .collect();
        if !self
            .authenticator
            .can_write(Some(&event.pubkey), &admins, self.config.access.public_write)
        {
            self.metrics.record_rejected().await;
            return Err(Error::Restricted("not allowed".to_string()));
        }

        let mut event = event;
        event.quality_score = quality::score(&event, &self.config.ingest);
        let quarantined = event.quality_score < self.config.ingest.quality_threshold;
        if quarantined {
            event.is_quarantined = true;
            event.quarantine_reason = Some("quality score below threshold".to_string());
        }

        let routing_key =
            RoutingKey::for_kind(event.kind, &self.config.ingest.recognized_kinds);
        if let Err(e) = self.bus.publish(event.clone(), routing_key).await {
            warn!(event_id = %event.id, "bus publish rejected, back-pressure");
            return Err(e);
        }

        self.metrics.record_ingested().await;
        if quarantined {
            self.metrics.record_quarantined().await;
            Ok(IngestOutcome::Quarantined(
                event.quarantine_reason.unwrap_or_default(),
            ))
        } else {
            Ok(IngestOutcome::Accepted)
        }
    }
}
