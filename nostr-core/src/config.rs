//! Relay configuration. Constructed in code from defaults, CLI flags,
//! and environment overrides for secrets; there is deliberately no
//! layered file/env config loader here.

use crate::kinds;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// (De)serializes a [`Duration`] as a plain count of seconds, matching the
/// teacher's convention for duration-bearing config structs.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// How the whitelist is derived when more than one admin is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhitelistMergeMode {
    /// Union of every admin's follow list (default).
    Union,
    /// Only pubkeys followed by every admin.
    Intersection,
}

impl Default for WhitelistMergeMode {
    fn default() -> Self {
        WhitelistMergeMode::Union
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub bind_addr: String,
    pub ws_path: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            ws_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub admins: HashSet<String>,
    pub public_write: bool,
    pub public_read: bool,
    pub relay_url: String,
    pub whitelist_merge_mode: WhitelistMergeMode,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admins: HashSet::new(),
            public_write: true,
            public_read: true,
            relay_url: "wss://localhost:8080".to_string(),
            whitelist_merge_mode: WhitelistMergeMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub recognized_kinds: HashSet<u32>,
    pub replaceable_kinds: HashSet<u32>,
    pub quality_threshold: f64,
    pub max_content_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            recognized_kinds: [
                kinds::USER_METADATA,
                kinds::TEXT_NOTE,
                kinds::CONTACT_LIST,
                kinds::DIRECTED_MESSAGE,
                kinds::DELETION,
                kinds::AUTH_PROOF,
                kinds::RELAY_LIST,
            ]
            .into_iter()
            .collect(),
            replaceable_kinds: kinds::default_replaceable_kinds(),
            quality_threshold: 0.7,
            max_content_bytes: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(with = "secs")]
    pub event_ttl: Duration,
    #[serde(with = "secs")]
    pub queue_message_ttl: Duration,
    pub queue_max_depth: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            event_ttl: Duration::from_secs(7 * 24 * 3600),
            queue_message_ttl: Duration::from_secs(24 * 3600),
            queue_max_depth: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(with = "secs")]
    pub challenge_ttl: Duration,
    #[serde(with = "secs")]
    pub auth_session_ttl: Duration,
    #[serde(with = "secs")]
    pub whitelist_refresh_interval: Duration,
    #[serde(with = "secs")]
    pub whitelist_positive_ttl: Duration,
    #[serde(with = "secs")]
    pub whitelist_negative_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(10 * 60),
            auth_session_ttl: Duration::from_secs(24 * 3600),
            whitelist_refresh_interval: Duration::from_secs(3600),
            whitelist_positive_ttl: Duration::from_secs(3600),
            whitelist_negative_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub network: NetworkConfig,
    pub access: AccessConfig,
    pub ingest: IngestConfig,
    pub retention: RetentionConfig,
    pub auth: AuthConfig,
    #[serde(with = "secs")]
    pub shutdown_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            access: AccessConfig::default(),
            ingest: IngestConfig::default(),
            retention: RetentionConfig::default(),
            auth: AuthConfig::default(),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.ingest.quality_threshold, 0.7);
        assert_eq!(cfg.ingest.max_content_bytes, 10_000);
        assert_eq!(cfg.auth.challenge_ttl, Duration::from_secs(600));
        assert_eq!(cfg.auth.auth_session_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(30));
    }

    #[test]
    fn admins_always_pass_write_gate_conceptually() {
        let mut cfg = RelayConfig::default();
        cfg.access.public_write = false;
        cfg.access.admins.insert("admin1".to_string());
        assert!(cfg.access.admins.contains("admin1"));
    }
}
