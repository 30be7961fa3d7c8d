//! `/stats` backing counters, using the same `metrics` crate macros
//! and `RwLock`-wrapped-counter layout the rest of the workspace uses.

use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Metrics {
    pub events_ingested_total: Arc<RwLock<u64>>,
    pub events_quarantined_total: Arc<RwLock<u64>>,
    pub events_rejected_total: Arc<RwLock<u64>>,
    pub active_connections: Arc<RwLock<u64>>,
    pub active_subscriptions: Arc<RwLock<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_ingested_total: Arc::new(RwLock::new(0)),
            events_quarantined_total: Arc::new(RwLock::new(0)),
            events_rejected_total: Arc::new(RwLock::new(0)),
            active_connections: Arc::new(RwLock::new(0)),
            active_subscriptions: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn record_ingested(&self) {
        let mut total = self.events_ingested_total.write().await;
        *total += 1;
        counter!("nostr_events_ingested_total").increment(1);
    }

    pub async fn record_quarantined(&self) {
        let mut total = self.events_quarantined_total.write().await;
        *total += 1;
        counter!("nostr_events_quarantined_total").increment(1);
    }

    pub async fn record_rejected(&self) {
        let mut total = self.events_rejected_total.write().await;
        *total += 1;
        counter!("nostr_events_rejected_total").increment(1);
    }

    pub async fn increment_connections(&self) {
        let mut conns = self.active_connections.write().await;
        *conns += 1;
        gauge!("nostr_active_connections").set(*conns as f64);
    }

    pub async fn decrement_connections(&self) {
        let mut conns = self.active_connections.write().await;
        if *conns > 0 {
            *conns -= 1;
        }
        gauge!("nostr_active_connections").set(*conns as f64);
    }

    pub async fn set_active_subscriptions(&self, count: u64) {
        let mut subs = self.active_subscriptions.write().await;
        *subs = count;
        gauge!("nostr_active_subscriptions").set(count as f64);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_ingested_total: *self.events_ingested_total.read().await,
            events_quarantined_total: *self.events_quarantined_total.read().await,
            events_rejected_total: *self.events_rejected_total.read().await,
            active_connections: *self.active_connections.read().await,
            active_subscriptions: *self.active_subscriptions.read().await,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// The JSON body served at `GET /stats`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub events_ingested_total: u64,
    pub events_quarantined_total: u64,
    pub events_rejected_total: u64,
    pub active_connections: u64,
    pub active_subscriptions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_counter_never_underflows() {
        let m = Metrics::new();
        m.decrement_connections().await;
        assert_eq!(*m.active_connections.read().await, 0);
    }

    #[tokio::test]
    async fn ingested_counter_increments() {
        let m = Metrics::new();
        m.record_ingested().await;
        m.record_ingested().await;
        assert_eq!(m.snapshot().await.events_ingested_total, 2);
    }
}
