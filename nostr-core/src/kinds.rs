//! Reserved kind ranges and taxonomy.

pub const USER_METADATA: u32 = 0;
pub const TEXT_NOTE: u32 = 1;
pub const CONTACT_LIST: u32 = 3;
pub const DIRECTED_MESSAGE: u32 = 4;
pub const DELETION: u32 = 5;
pub const AUTH_PROOF: u32 = 22242;
pub const RELAY_LIST: u32 = 10002;

pub const PARAMETERIZED_REPLACEABLE_MIN: u32 = 30_000;
pub const PARAMETERIZED_REPLACEABLE_MAX: u32 = 30_078;

pub const ENCRYPTED_ENVELOPE_MIN: u32 = 1_059;
pub const ENCRYPTED_ENVELOPE_MAX: u32 = 1_999;

/// Kinds whose events are replaceable: only the latest `(kind, pubkey,
/// d-tag)` version is canonical. Parameterized-replaceable kinds
/// (30000-30078) are always included regardless of the configured set.
pub fn is_replaceable(kind: u32, replaceable_kinds: &std::collections::HashSet<u32>) -> bool {
    replaceable_kinds.contains(&kind) || is_parameterized_replaceable(kind)
}

pub fn is_parameterized_replaceable(kind: u32) -> bool {
    (PARAMETERIZED_REPLACEABLE_MIN..=PARAMETERIZED_REPLACEABLE_MAX).contains(&kind)
}

/// Encrypted-envelope kinds deliver only to the event's author.
pub fn is_encrypted_envelope(kind: u32) -> bool {
    (ENCRYPTED_ENVELOPE_MIN..=ENCRYPTED_ENVELOPE_MAX).contains(&kind)
}

/// The default replaceable set: user metadata, contact list, relay
/// list. Parameterized-replaceable kinds are handled separately by
/// [`is_parameterized_replaceable`].
pub fn default_replaceable_kinds() -> std::collections::HashSet<u32> {
    [USER_METADATA, CONTACT_LIST, RELAY_LIST].into_iter().collect()
}
