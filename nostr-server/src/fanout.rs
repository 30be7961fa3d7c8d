//! The fan-out consumer loop and privacy filter.

use crate::frame::ServerFrame;
use crate::session_registry::SessionRegistry;
use nostr_core::kinds::{is_encrypted_envelope, is_replaceable, DIRECTED_MESSAGE};
use nostr_core::{Event, PubKey};
use nostr_storage::{IndexedCache, MessageBus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Whether `recipient` (the viewing session's authenticated pubkey, if
/// any) is allowed to see `event`.
pub fn privacy_allows(event: &Event, recipient: Option<&PubKey>) -> bool {
    if let Some(recipient) = recipient {
        if *recipient == event.pubkey {
            return true;
        }
    }

    if event.kind == DIRECTED_MESSAGE {
        return match recipient {
            Some(recipient) => event.p_tags().iter().any(|p| p == recipient),
            None => false,
        };
    }

    if is_encrypted_envelope(event.kind) {
        return false;
    }

    true
}

/// Quarantined events are additionally restricted to admins and the
/// event's own author.
pub fn quarantine_allows(event: &Event, recipient: Option<&PubKey>, admins: &HashSet<PubKey>) -> bool {
    if !event.is_quarantined {
        return true;
    }
    match recipient {
        Some(recipient) => *recipient == event.pubkey || admins.contains(recipient),
        None => false,
    }
}

/// Drains the bus's fan-out queue, storing each event in the cache and
/// pushing it to every matching, privacy-permitted live subscription.
pub async fn run(
    bus: Arc<MessageBus>,
    cache: Arc<IndexedCache>,
    registry: Arc<SessionRegistry>,
    replaceable_kinds: HashSet<u32>,
    admins: HashSet<PubKey>,
    cancellation: CancellationToken,
) {
    loop {
        if cancellation.is_cancelled() {
            break;
        }

        let Some(entry) = bus.consume().await else {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
                _ = cancellation.cancelled() => break,
            }
            continue;
        };

        let event = entry.event.clone();
        let replaceable = is_replaceable(event.kind, &replaceable_kinds);
        cache.insert(event.clone(), replaceable);

        for (session_id, state) in registry.snapshot() {
            for (sub_id, subscription) in &state.subscriptions {
                let matches = subscription.filters.iter().any(|f| f.matches(&event));
                if !matches {
                    continue;
                }
                if !privacy_allows(&event, state.pubkey.as_ref()) {
                    continue;
                }
                if !quarantine_allows(&event, state.pubkey.as_ref(), &admins) {
                    continue;
                }
                let frame = ServerFrame::event(sub_id.clone(), event.clone());
                if !registry.send_to(&session_id, frame).await {
                    warn!(session = %session_id, "outbound buffer full or closed, dropping session");
                }
            }
        }

        bus.ack(&event.id.0).await;
        debug!(event_id = %event.id, "fanned out event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_core::event::Signature;
    use nostr_core::EventId;

    fn event(kind: u32, author: &str, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: EventId::from("e1"),
            pubkey: PubKey::from(author),
            created_at: 100,
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
    fn author_always_sees_own_event() {
        let e = event(4, "a", vec![vec!["p".into(), "b".into()]]);
        assert!(privacy_allows(&e, Some(&PubKey::from("a"))));
    }

    #[test]
    fn directed_message_visible_only_to_participants() {
        let e = event(DIRECTED_MESSAGE, "a", vec![vec!["p".into(), "b".into()]]);
        assert!(privacy_allows(&e, Some(&PubKey::from("b"))));
        assert!(!privacy_allows(&e, Some(&PubKey::from("c"))));
        assert!(!privacy_allows(&e, None));
    }

    #[test]
    fn encrypted_envelope_visible_only_to_author() {
        let e = event(1500, "a", vec![]);
        assert!(privacy_allows(&e, Some(&PubKey::from("a"))));
        assert!(!privacy_allows(&e, Some(&PubKey::from("b"))));
    }

    #[test]
    fn ordinary_kind_has_no_restriction() {
        let e = event(1, "a", vec![]);
        assert!(privacy_allows(&e, Some(&PubKey::from("stranger"))));
        assert!(privacy_allows(&e, None));
    }

    #[test]
    fn quarantined_event_restricted_to_admin_and_author() {
        let mut e = event(1, "a", vec![]);
        e.is_quarantined = true;
        let admins: HashSet<PubKey> = [PubKey::from("admin")].into_iter().collect();
        assert!(quarantine_allows(&e, Some(&PubKey::from("a")), &admins));
        assert!(quarantine_allows(&e, Some(&PubKey::from("admin")), &admins));
        assert!(!quarantine_allows(&e, Some(&PubKey::from("stranger")), &admins));
        assert!(!quarantine_allows(&e, None, &admins));
    }
}
