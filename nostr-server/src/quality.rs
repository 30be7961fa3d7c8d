//! Quality scoring: a multiplicative composition of penalties and
//! bonuses producing a score in `[0, 1]`.

use nostr_core::config::IngestConfig;
use nostr_core::Event;

const DENYLIST_PHRASES: &[&str] = &["viral crypto giveaway", "click here now", "free airdrop"];

fn length_factor(content: &str) -> f64 {
    let len = content.len();
    if len < 10 {
        0.6
    } else if len > 5000 {
        0.7
    } else {
        1.0
    }
}

fn tag_count_factor(tag_count: usize) -> f64 {
    if tag_count > 20 {
        0.5
    } else if (1..=5).contains(&tag_count) {
        1.1
    } else {
        1.0
    }
}

/// Structured-content kinds get a validity check; everything else is
/// unconstrained by this factor.
fn per_kind_factor(event: &Event) -> f64 {
    match event.kind {
        nostr_core::kinds::USER_METADATA | nostr_core::kinds::RELAY_LIST => {
            if serde_json::from_str::<serde_json::Value>(&event.content).is_ok() {
                1.0
            } else {
                0.4
            }
        }
        _ => 1.0,
    }
}

fn spam_factor(content: &str) -> f64 {
    let lower = content.to_lowercase();
    if DENYLIST_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return 0.1;
    }

    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() >= 4 {
        let unique: std::collections::HashSet<&str> = words.iter().copied().collect();
        let repetition_ratio = 1.0 - (unique.len() as f64 / words.len() as f64);
        if repetition_ratio > 0.6 {
            return 0.5;
        }
    }

    let mention_count = content.matches('@').count();
    if mention_count > 10 {
        return 0.5;
    }

    1.0
}

/// Composes the individual factors and clamps to `[0, 1]`.
pub fn score(event: &Event, _config: &IngestConfig) -> f64 {
    let raw = length_factor(&event.content)
        * tag_count_factor(event.tags.len())
        * per_kind_factor(event)
        * spam_factor(&event.content);
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_core::event::{PubKey, Signature};
    use nostr_core::EventId;

    fn event_with_content(content: &str, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: EventId::from("e1"),
            pubkey: PubKey::from("a1"),
            created_at: 100,
            kind: 1,
            tags,
            content: content.to_string(),
            sig: Signature("sig".into()),
            quality_score: 0.0,
            is_quarantined: false,
            quarantine_reason: None,
        }
    }

    #[test]
    fn normal_note_scores_highly() {
        let event = event_with_content("a reasonably sized note about something", vec![]);
        assert!(score(&event, &IngestConfig::default()) > 0.9);
    }

    #[test]
    fn excessive_tags_reduce_score() {
        let tags: Vec<Vec<String>> = (0..25).map(|i| vec!["t".to_string(), i.to_string()]).collect();
        let event = event_with_content("some content here", tags);
        assert!(score(&event, &IngestConfig::default()) < 0.7);
    }

    #[test]
    fn denylisted_phrase_is_heavily_penalized() {
        let event = event_with_content("free airdrop click now", vec![]);
        assert!(score(&event, &IngestConfig::default()) < 0.2);
    }

    #[test]
    fn tiny_content_is_penalized() {
        let event = event_with_content("hi", vec![]);
        assert!(score(&event, &IngestConfig::default()) < 1.0);
    }
}
