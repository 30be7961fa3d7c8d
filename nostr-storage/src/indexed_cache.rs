//! The indexed event cache: primary store by id, secondary indices
//! by author/kind/tag, and replaceable-event version history.

use dashmap::{DashMap, DashSet};
use nostr_core::filter::IndexChoice;
use nostr_core::{Event, EventId, Filter, PubKey};
use std::collections::HashSet;
use std::time::{Duration, Instant};

struct StoredEvent {
    event: Event,
    stored_at: Instant,
}

/// `(kind, pubkey, d-tag)`, identity of a replaceable event lineage.
type ReplaceableKey = (u32, PubKey, String);

/// Primary KV store plus secondary indices, with a TTL applied to every
/// entry and a separate version history for replaceable kinds.
pub struct IndexedCache {
    primary: DashMap<EventId, StoredEvent>,
    by_author: DashMap<PubKey, DashSet<EventId>>,
    by_kind: DashMap<u32, DashSet<EventId>>,
    by_tag: DashMap<(String, String), DashSet<EventId>>,
    replaceable_versions: DashMap<ReplaceableKey, Vec<EventId>>,
    replaceable_latest: DashMap<ReplaceableKey, EventId>,
    ttl: Duration,
}

impl IndexedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            primary: DashMap::new(),
            by_author: DashMap::new(),
            by_kind: DashMap::new(),
            by_tag: DashMap::new(),
            replaceable_versions: DashMap::new(),
            replaceable_latest: DashMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, stored: &StoredEvent) -> bool {
        stored.stored_at.elapsed() > self.ttl
    }

    /// Insert an event, updating every secondary index. If `replaceable`,
    /// older versions sharing the same `(kind, pubkey, d-tag)` remain
    /// retrievable via [`history`] but no longer surface as `latest`.
    pub fn insert(&self, event: Event, replaceable: bool) {
        let id = event.id.clone();
        self.by_author
            .entry(event.pubkey.clone())
            .or_default()
            .insert(id.clone());
        self.by_kind.entry(event.kind).or_default().insert(id.clone());
        for tag in &event.tags {
            if let (Some(name), Some(value)) = (tag.first(), tag.get(1)) {
                self.by_tag
                    .entry((name.clone(), value.clone()))
                    .or_default()
                    .insert(id.clone());
            }
        }

        if replaceable {
            let key = event.replaceable_key();
            self.replaceable_versions
                .entry(key.clone())
                .or_default()
                .push(id.clone());
            // Ties on created_at favor the lexicographically greatest id,
            // so replay order never affects which version is canonical.
            let supersedes_existing = self
                .replaceable_latest
                .get(&key)
                .and_then(|latest_id| self.primary.get(latest_id.value()))
                .map(|latest| {
                    (event.created_at, &event.id.0) >= (latest.event.created_at, &latest.event.id.0)
                })
                .unwrap_or(true);
            if supersedes_existing {
                self.replaceable_latest.insert(key, id.clone());
            }
        }

        self.primary.insert(
            id,
            StoredEvent {
                event,
                stored_at: Instant::now(),
            },
        );
    }

    /// Idempotent: removing an absent id is not an error.
    pub fn delete(&self, id: &EventId) {
        self.primary.remove(id);
    }

    pub fn get(&self, id: &EventId) -> Option<Event> {
        let stored = self.primary.get(id)?;
        if self.is_expired(&stored) {
            return None;
        }
        Some(stored.event.clone())
    }

    /// The current canonical version of a replaceable lineage.
    pub fn latest(&self, key: &ReplaceableKey) -> Option<Event> {
        let id = self.replaceable_latest.get(key)?;
        self.get(&id)
    }

    /// Every stored version of a replaceable lineage, oldest first.
    pub fn history(&self, key: &ReplaceableKey) -> Vec<Event> {
        let Some(ids) = self.replaceable_versions.get(key) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    fn candidate_ids(&self, filter: &Filter) -> HashSet<EventId> {
        match filter.best_index() {
            IndexChoice::Ids => filter.ids.clone().unwrap_or_default(),
            IndexChoice::Authors => {
                let mut ids = HashSet::new();
                for author in filter.authors.iter().flatten() {
                    if let Some(set) = self.by_author.get(author) {
                        ids.extend(set.iter().map(|e| e.clone()));
                    }
                }
                ids
            }
            IndexChoice::Tags => {
                let mut ids = HashSet::new();
                for (name, values) in &filter.tags {
                    for value in values {
                        if let Some(set) = self.by_tag.get(&(name.clone(), value.clone())) {
                            ids.extend(set.iter().map(|e| e.clone()));
                        }
                    }
                }
                ids
            }
            IndexChoice::Kinds => {
                let mut ids = HashSet::new();
                for kind in filter.kinds.iter().flatten() {
                    if let Some(set) = self.by_kind.get(kind) {
                        ids.extend(set.iter().map(|e| e.clone()));
                    }
                }
                ids
            }
            IndexChoice::Scan => self.primary.iter().map(|e| e.key().clone()).collect(),
        }
    }

    /// Select the best index per [`Filter::best_index`], materialize
    /// candidates, apply remaining predicates, project replaceable
    /// lineages onto their latest version, and sort by `created_at`
    /// descending (lexicographic id as tie-break), honoring `limit`.
    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        let candidates = self.candidate_ids(filter);
        let mut matched: Vec<Event> = candidates
            .into_iter()
            .filter_map(|id| self.get(&id))
            .filter(|event| filter.matches(event))
            .filter(|event| self.is_current_version(event))
            .collect();

        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });

        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// For an event belonging to a replaceable lineage, only the
    /// `replaceable_latest` member passes. Events with no lineage on
    /// record (non-replaceable kinds) always pass.
    fn is_current_version(&self, event: &Event) -> bool {
        match self.replaceable_latest.get(&event.replaceable_key()) {
            Some(latest_id) => *latest_id.value() == event.id,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_core::event::{PubKey as CorePubKey, Signature};

    fn event(id: &str, author: &str, kind: u32, created_at: i64, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: EventId::from(id),
            pubkey: CorePubKey::from(author),
            created_at,
            kind,
            tags,
            content: String::new(),
            sig: Signature("sig".into()),
            quality_score: 1.0,
            is_quarantined: false,
            quarantine_reason: None,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let cache = IndexedCache::new(Duration::from_secs(3600));
        cache.insert(event("e1", "a1", 1, 100, vec![]), false);
        assert!(cache.get(&EventId::from("e1")).is_some());
    }

    #[test]
    fn delete_is_idempotent() {
        let cache = IndexedCache::new(Duration::from_secs(3600));
        cache.delete(&EventId::from("missing"));
        cache.insert(event("e1", "a1", 1, 100, vec![]), false);
        cache.delete(&EventId::from("e1"));
        cache.delete(&EventId::from("e1"));
        assert!(cache.get(&EventId::from("e1")).is_none());
    }

    #[test]
    fn query_by_author_index() {
        let cache = IndexedCache::new(Duration::from_secs(3600));
        cache.insert(event("e1", "a1", 1, 100, vec![]), false);
        cache.insert(event("e2", "a2", 1, 101, vec![]), false);
        let mut filter = Filter::default();
        filter.authors = Some([CorePubKey::from("a1")].into_iter().collect());
        let results = cache.query(&filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.0, "e1");
    }

    #[test]
    fn query_orders_newest_first() {
        let cache = IndexedCache::new(Duration::from_secs(3600));
        cache.insert(event("e1", "a1", 1, 100, vec![]), false);
        cache.insert(event("e2", "a1", 1, 200, vec![]), false);
        let mut filter = Filter::default();
        filter.authors = Some([CorePubKey::from("a1")].into_iter().collect());
        let results = cache.query(&filter);
        assert_eq!(results[0].id.0, "e2");
        assert_eq!(results[1].id.0, "e1");
    }

    #[test]
    fn replaceable_latest_tracks_newest_version() {
        let cache = IndexedCache::new(Duration::from_secs(3600));
        cache.insert(
            event("v1", "a1", 0, 100, vec![vec!["d".into(), "".into()]]),
            true,
        );
        cache.insert(
            event("v2", "a1", 0, 200, vec![vec!["d".into(), "".into()]]),
            true,
        );
        let key = (0u32, CorePubKey::from("a1"), String::new());
        assert_eq!(cache.latest(&key).unwrap().id.0, "v2");
        assert_eq!(cache.history(&key).len(), 2);
    }

    #[test]
    fn query_projects_replaceable_lineage_onto_latest() {
        let cache = IndexedCache::new(Duration::from_secs(3600));
        cache.insert(event("e3", "a1", 0, 100, vec![]), true);
        cache.insert(event("e4", "a1", 0, 200, vec![]), true);
        let mut filter = Filter::default();
        filter.authors = Some([CorePubKey::from("a1")].into_iter().collect());
        filter.kinds = Some([0].into_iter().collect());
        let results = cache.query(&filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.0, "e4");
    }

    #[test]
    fn tag_index_matches_filter() {
        let cache = IndexedCache::new(Duration::from_secs(3600));
        cache.insert(
            event("e1", "a1", 4, 100, vec![vec!["p".into(), "bob".into()]]),
            false,
        );
        let mut filter = Filter::default();
        filter
            .tags
            .insert("p".to_string(), ["bob".to_string()].into_iter().collect());
        let results = cache.query(&filter);
        assert_eq!(results.len(), 1);
    }

    proptest::proptest! {
        /// Replaying the same two versions of a replaceable event in
        /// either insertion order always settles on the same `latest`
        /// pointer (greatest `created_at`, ties broken by greatest id).
        #[test]
        fn replaceable_latest_is_order_independent(
            created_a in 0i64..1_000_000,
            created_b in 0i64..1_000_000,
        ) {
            let expected = if created_a != created_b {
                if created_a > created_b { "va" } else { "vb" }
            } else if "va" >= "vb" { "va" } else { "vb" };

            let forward = IndexedCache::new(Duration::from_secs(3600));
            forward.insert(event("va", "a1", 0, created_a, vec![]), true);
            forward.insert(event("vb", "a1", 0, created_b, vec![]), true);

            let backward = IndexedCache::new(Duration::from_secs(3600));
            backward.insert(event("vb", "a1", 0, created_b, vec![]), true);
            backward.insert(event("va", "a1", 0, created_a, vec![]), true);

            let key = (0u32, CorePubKey::from("a1"), String::new());
            prop_assert_eq!(forward.latest(&key).unwrap().id.0, expected);
            prop_assert_eq!(backward.latest(&key).unwrap().id.0, expected);
        }
    }
}
