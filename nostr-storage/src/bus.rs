//! The message bus: a fan-out exchange carrying every event plus a
//! topic exchange keyed by routing key, each queue with an explicit
//! ack/nack protocol, a message TTL, and a bound dead-letter queue.

use dashmap::DashMap;
use nostr_core::{Error, Event, Result};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Topic routing key, derived from an event's kind and validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    Kind(u32),
    Undefined,
    Moderation,
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingKey::Kind(k) => write!(f, "kind.{k}"),
            RoutingKey::Undefined => write!(f, "kind.undefined"),
            RoutingKey::Moderation => write!(f, "kind.moderation"),
        }
    }
}

impl RoutingKey {
    pub fn for_kind(kind: u32, recognized_kinds: &std::collections::HashSet<u32>) -> Self {
        if recognized_kinds.contains(&kind) {
            RoutingKey::Kind(kind)
        } else {
            RoutingKey::Undefined
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub event: Event,
    pub enqueued_at: Instant,
}

/// A durable queue: FIFO messages, explicit ack/nack via an in-flight set,
/// a message TTL, and a bound dead-letter queue for expired messages.
struct Queue {
    messages: VecDeque<QueueEntry>,
    in_flight: HashMap<String, Instant>,
    dlq: VecDeque<QueueEntry>,
    message_ttl: Duration,
    max_depth: usize,
}

impl Queue {
    fn new(message_ttl: Duration, max_depth: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            dlq: VecDeque::new(),
            message_ttl,
            max_depth,
        }
    }

    /// Move every expired, non-in-flight message to the dead-letter queue.
    fn sweep_expired(&mut self) {
        let ttl = self.message_ttl;
        let mut i = 0;
        while i < self.messages.len() {
            if self.messages[i].enqueued_at.elapsed() > ttl {
                let expired = self.messages.remove(i).unwrap();
                self.dlq.push_back(expired);
            } else {
                i += 1;
            }
        }
    }

    fn publish(&mut self, event: Event) -> Result<()> {
        self.sweep_expired();
        if self.messages.len() >= self.max_depth {
            return Err(Error::Transient);
        }
        self.messages.push_back(QueueEntry {
            event,
            enqueued_at: Instant::now(),
        });
        Ok(())
    }

    fn consume(&mut self) -> Option<QueueEntry> {
        self.sweep_expired();
        let entry = self.messages.pop_front()?;
        self.in_flight
            .insert(entry.event.id.0.clone(), Instant::now());
        Some(entry)
    }

    fn ack(&mut self, id: &str) {
        self.in_flight.remove(id);
    }

    fn nack(&mut self, entry: QueueEntry) {
        self.in_flight.remove(&entry.event.id.0);
        self.messages.push_front(entry);
    }

    fn depth(&self) -> usize {
        self.messages.len()
    }

    fn dlq_depth(&self) -> usize {
        self.dlq.len()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BusStats {
    pub fanout_depth: usize,
    pub fanout_dlq_depth: usize,
    pub topic_depths: HashMap<String, usize>,
    pub topic_dlq_depths: HashMap<String, usize>,
}

/// The bus contract exposed to the ingest pipeline and the fan-out/topic
/// consumers: `publish`, `consume`, `consume_by_kind`, `stats`.
pub struct MessageBus {
    fanout: Mutex<Queue>,
    topics: DashMap<RoutingKey, Mutex<Queue>>,
    message_ttl: Duration,
    max_depth: usize,
}

impl MessageBus {
    pub fn new(message_ttl: Duration, max_depth: usize) -> Self {
        Self {
            fanout: Mutex::new(Queue::new(message_ttl, max_depth)),
            topics: DashMap::new(),
            message_ttl,
            max_depth,
        }
    }

    fn ensure_topic(&self, key: RoutingKey) {
        self.topics
            .entry(key)
            .or_insert_with(|| Mutex::new(Queue::new(self.message_ttl, self.max_depth)));
    }

    /// Fan-out + topic publish in a single logical act (at-least-once).
    pub async fn publish(&self, event: Event, routing_key: RoutingKey) -> Result<()> {
        self.fanout.lock().await.publish(event.clone())?;
        self.ensure_topic(routing_key.clone());
        let topic = self.topics.get(&routing_key).expect("topic just inserted");
        topic.lock().await.publish(event)?;
        debug!(topic = %routing_key, "published event to bus");
        Ok(())
    }

    /// Pull one event from the main fan-out queue.
    pub async fn consume(&self) -> Option<QueueEntry> {
        self.fanout.lock().await.consume()
    }

    pub async fn ack(&self, id: &str) {
        self.fanout.lock().await.ack(id);
    }

    pub async fn nack(&self, entry: QueueEntry) {
        self.fanout.lock().await.nack(entry);
    }

    /// Pull one event from a kind-specific topic queue.
    pub async fn consume_by_kind(&self, key: RoutingKey) -> Option<QueueEntry> {
        self.ensure_topic(key.clone());
        let topic = self.topics.get(&key).expect("topic just inserted");
        topic.lock().await.consume()
    }

    pub async fn ack_topic(&self, key: RoutingKey, id: &str) {
        self.ensure_topic(key.clone());
        let topic = self.topics.get(&key).expect("topic just inserted");
        topic.lock().await.ack(id);
    }

    pub async fn nack_topic(&self, key: RoutingKey, entry: QueueEntry) {
        self.ensure_topic(key.clone());
        let topic = self.topics.get(&key).expect("topic just inserted");
        topic.lock().await.nack(entry);
    }

    pub async fn stats(&self) -> BusStats {
        let fanout = self.fanout.lock().await;
        let mut stats = BusStats {
            fanout_depth: fanout.depth(),
            fanout_dlq_depth: fanout.dlq_depth(),
            topic_depths: HashMap::new(),
            topic_dlq_depths: HashMap::new(),
        };
        drop(fanout);
        for entry in self.topics.iter() {
            let q = entry.value().lock().await;
            stats.topic_depths.insert(entry.key().to_string(), q.depth());
            stats
                .topic_dlq_depths
                .insert(entry.key().to_string(), q.dlq_depth());
        }
        stats
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600), 100_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_core::{EventId, PubKey, Signature};

    fn sample_event(id: &str) -> Event {
        Event {
            id: EventId::from(id),
            pubkey: PubKey::from("a"),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: String::new(),
            sig: Signature("s".into()),
            quality_score: 1.0,
            is_quarantined: false,
            quarantine_reason: None,
        }
    }

    #[tokio::test]
    async fn publish_then_consume_fifo() {
        let bus = MessageBus::new(Duration::from_secs(60), 10);
        bus.publish(sample_event("e1"), RoutingKey::Kind(1))
            .await
            .unwrap();
        bus.publish(sample_event("e2"), RoutingKey::Kind(1))
            .await
            .unwrap();
        let first = bus.consume().await.unwrap();
        assert_eq!(first.event.id.0, "e1");
        bus.ack(&first.event.id.0).await;
        let second = bus.consume().await.unwrap();
        assert_eq!(second.event.id.0, "e2");
    }

    #[tokio::test]
    async fn backpressure_rejects_when_full() {
        let bus = MessageBus::new(Duration::from_secs(60), 1);
        bus.publish(sample_event("e1"), RoutingKey::Kind(1))
            .await
            .unwrap();
        let err = bus.publish(sample_event("e2"), RoutingKey::Kind(1)).await;
        assert!(matches!(err, Err(Error::Transient)));
    }

    #[tokio::test]
    async fn nack_requeues_at_front() {
        let bus = MessageBus::new(Duration::from_secs(60), 10);
        bus.publish(sample_event("e1"), RoutingKey::Kind(1))
            .await
            .unwrap();
        let entry = bus.consume().await.unwrap();
        bus.nack(entry).await;
        let redelivered = bus.consume().await.unwrap();
        assert_eq!(redelivered.event.id.0, "e1");
    }

    #[tokio::test]
    async fn topic_queues_are_independent_of_fanout() {
        let bus = MessageBus::new(Duration::from_secs(60), 10);
        bus.publish(sample_event("e1"), RoutingKey::Kind(1))
            .await
            .unwrap();
        let stats = bus.stats().await;
        assert_eq!(stats.fanout_depth, 1);
        assert_eq!(stats.topic_depths.get("kind.1"), Some(&1));
    }
}
