//! The wire event model shared by every component of the relay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded 32-byte event id (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

/// Hex-encoded 32-byte author identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PubKey(pub String);

/// Hex-encoded 64-byte schnorr signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}

impl From<&str> for PubKey {
    fn from(s: &str) -> Self {
        PubKey(s.to_string())
    }
}

/// A single tag: an ordered sequence of strings, tag-name at index 0.
pub type Tag = Vec<String>;

/// Where an event entered the ingestion pipeline from.
///
/// Federated submissions skip the stricter local `created_at` window
/// since they may be replayed from an upstream relay well
/// after they were first authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Published,
    Federated,
}

/// The atomic unit of the protocol. Immutable after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub pubkey: PubKey,
    pub created_at: i64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: Signature,

    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub is_quarantined: bool,
    #[serde(default)]
    pub quarantine_reason: Option<String>,
}

impl Event {
    /// The value of the first `d` tag, or `""` if absent. Part of the
    /// identity key for replaceable/parameterized-replaceable kinds.
    pub fn d_tag(&self) -> String {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some("d"))
            .and_then(|t| t.get(1))
            .cloned()
            .unwrap_or_default()
    }

    /// Every pubkey named in a `p` tag, in tag order.
    pub fn p_tags(&self) -> Vec<PubKey> {
        self.tags
            .iter()
            .filter(|t| t.first().map(String::as_str) == Some("p"))
            .filter_map(|t| t.get(1))
            .map(|s| PubKey(s.clone()))
            .collect()
    }

    /// Values of every tag with the given name, in tag order.
    pub fn tag_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1).map(String::as_str))
    }

    /// `(kind, pubkey, d-tag)`, the identity key of a replaceable event.
    pub fn replaceable_key(&self) -> (u32, PubKey, String) {
        (self.kind, self.pubkey.clone(), self.d_tag())
    }
}
