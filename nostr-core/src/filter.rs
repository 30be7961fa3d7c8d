//! A disjunction-free conjunctive predicate over events.

use crate::event::{Event, EventId, PubKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<HashSet<EventId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<HashSet<PubKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<HashSet<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    /// tag-name -> set of allowed values, e.g. `{"p": {"abc"}}` from a
    /// client's `#p` filter field.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, HashSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// An Event matches when every *specified* field is satisfied; an
    /// absent field is unconstrained.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        for (name, allowed) in &self.tags {
            let has_match = event.tag_values(name).any(|v| allowed.contains(v));
            if !has_match {
                return false;
            }
        }
        true
    }

    /// The most selective index this filter can use, per the preference
    /// order `ids -> authors -> tags -> kinds -> scan`.
    pub fn best_index(&self) -> IndexChoice {
        if self.ids.is_some() {
            IndexChoice::Ids
        } else if self.authors.is_some() {
            IndexChoice::Authors
        } else if !self.tags.is_empty() {
            IndexChoice::Tags
        } else if self.kinds.is_some() {
            IndexChoice::Kinds
        } else {
            IndexChoice::Scan
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChoice {
    Ids,
    Authors,
    Tags,
    Kinds,
    Scan,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(kind: u32, author: &str, created_at: i64, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: EventId::from("e1"),
            pubkey: PubKey::from(author),
            created_at,
            kind,
            tags,
            content: String::new(),
            sig: crate::event::Signature("sig".into()),
            quality_score: 1.0,
            is_quarantined: false,
            quarantine_reason: None,
        }
    }

    #[test]
    fn unconstrained_filter_matches_everything() {
        let f = Filter::default();
        assert!(f.matches(&sample_event(1, "a", 100, vec![])));
    }

    #[test]
    fn kind_filter_excludes_other_kinds() {
        let mut f = Filter::default();
        f.kinds = Some([1].into_iter().collect());
        assert!(f.matches(&sample_event(1, "a", 100, vec![])));
        assert!(!f.matches(&sample_event(2, "a", 100, vec![])));
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let mut f = Filter::default();
        f.since = Some(100);
        f.until = Some(200);
        assert!(f.matches(&sample_event(1, "a", 100, vec![])));
        assert!(f.matches(&sample_event(1, "a", 200, vec![])));
        assert!(!f.matches(&sample_event(1, "a", 99, vec![])));
        assert!(!f.matches(&sample_event(1, "a", 201, vec![])));
    }

    #[test]
    fn tag_filter_requires_value_match() {
        let mut f = Filter::default();
        f.tags
            .insert("p".to_string(), ["bob".to_string()].into_iter().collect());
        let with_tag = sample_event(4, "a", 100, vec![vec!["p".into(), "bob".into()]]);
        let without_tag = sample_event(4, "a", 100, vec![vec!["p".into(), "carol".into()]]);
        assert!(f.matches(&with_tag));
        assert!(!f.matches(&without_tag));
    }

    #[test]
    fn best_index_prefers_ids_over_everything() {
        let mut f = Filter::default();
        f.ids = Some([EventId::from("e1")].into_iter().collect());
        f.authors = Some([PubKey::from("a")].into_iter().collect());
        assert_eq!(f.best_index(), IndexChoice::Ids);
    }

    #[test]
    fn best_index_falls_back_to_scan() {
        assert_eq!(Filter::default().best_index(), IndexChoice::Scan);
    }

    proptest::proptest! {
        /// `since`/`until` gating always agrees with a direct inclusive
        /// range comparison, for any ordering of the three timestamps.
        #[test]
        fn time_bounds_match_inclusive_range(since in 0i64..10_000, until in 0i64..10_000, created_at in 0i64..10_000) {
            let mut f = Filter::default();
            f.since = Some(since);
            f.until = Some(until);
            let expected = created_at >= since && created_at <= until;
            prop_assert_eq!(f.matches(&sample_event(1, "a", created_at, vec![])), expected);
        }
    }
}
