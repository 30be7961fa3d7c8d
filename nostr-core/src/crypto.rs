//! Event id hashing and schnorr signature verification.
//!
//! The ingestion pipeline calls [`verify_signature`] and treats anything
//! other than `Ok(true)` as a validation failure.

use crate::event::{Event, EventId};
use secp256k1::{schnorr, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

/// The NIP-01 canonical serialization hashed to produce an event id:
/// `[0, pubkey, created_at, kind, tags, content]`.
pub fn compute_id(event: &Event) -> EventId {
    let canonical = serde_json::json!([
        0,
        event.pubkey.0,
        event.created_at,
        event.kind,
        event.tags,
        event.content,
    ]);
    let bytes = serde_json::to_vec(&canonical).expect("json array serialization cannot fail");
    let digest = Sha256::digest(&bytes);
    EventId(hex::encode(digest))
}

/// Verify that `sig` is a valid schnorr signature over `id` by `pubkey`.
///
/// Malformed hex or out-of-range curve points are verification failures,
/// not panics. The pipeline surfaces them as ordinary `validation` errors.
pub fn verify_signature(event: &Event) -> bool {
    let Ok(id_bytes) = hex::decode(&event.id.0) else {
        return false;
    };
    if id_bytes.len() != 32 {
        return false;
    }
    let Ok(pubkey_bytes) = hex::decode(&event.pubkey.0) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(&event.sig.0) else {
        return false;
    };

    let Ok(message) = Message::from_digest_slice(&id_bytes) else {
        return false;
    };
    let Ok(pubkey) = XOnlyPublicKey::from_slice(&pubkey_bytes) else {
        return false;
    };
    let Ok(signature) = schnorr::Signature::from_slice(&sig_bytes) else {
        return false;
    };

    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&signature, &message, &pubkey).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PubKey, Signature};

    fn base_event() -> Event {
        Event {
            id: EventId::from(""),
            pubkey: PubKey::from("aa".repeat(32).as_str()),
            created_at: 100,
            kind: 1,
            tags: vec![],
            content: "hi".to_string(),
            sig: Signature("00".repeat(64)),
            quality_score: 1.0,
            is_quarantined: false,
            quarantine_reason: None,
        }
    }

    #[test]
    fn compute_id_is_deterministic() {
        let e = base_event();
        assert_eq!(compute_id(&e), compute_id(&e));
    }

    #[test]
    fn compute_id_changes_with_content() {
        let mut a = base_event();
        let mut b = base_event();
        a.content = "hi".into();
        b.content = "bye".into();
        assert_ne!(compute_id(&a), compute_id(&b));
    }

    #[test]
    fn verify_signature_rejects_malformed_hex() {
        let mut e = base_event();
        e.id = EventId::from("not-hex");
        assert!(!verify_signature(&e));
    }

    #[test]
    fn verify_signature_rejects_wrong_length_sig() {
        let mut e = base_event();
        e.id = EventId(hex::encode([1u8; 32]));
        e.sig = Signature("ab".into());
        assert!(!verify_signature(&e));
    }
}
