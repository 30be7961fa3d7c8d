//! The session registry: one entry per live WebSocket connection,
//! each owning its own subscription table. Fan-out addresses sessions
//! through the registry only; a [`Subscription`] never holds a pointer
//! back to its owning session.

use crate::frame::ServerFrame;
use nostr_core::{Filter, PubKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type SessionId = String;

#[derive(Debug, Clone)]
pub struct Subscription {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: SessionId,
    pub pubkey: Option<PubKey>,
    pub subscriptions: HashMap<String, Subscription>,
    pub created_at: u64,
    pub last_activity: u64,
}

#[derive(Debug, Clone)]
pub struct SessionRegistryConfig {
    pub max_sessions: usize,
    pub max_subscriptions_per_session: usize,
    pub session_timeout_secs: u64,
}

impl Default for SessionRegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            max_subscriptions_per_session: 50,
            session_timeout_secs: 600,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Maps each live session id to its subscription table and outbound
/// sender. Fan-out iterates this table under a read lock per session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
    senders: RwLock<HashMap<SessionId, mpsc::Sender<ServerFrame>>>,
    config: SessionRegistryConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionRegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            senders: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn register(
        &self,
        id: SessionId,
        sender: mpsc::Sender<ServerFrame>,
    ) -> Result<(), String> {
        let sessions = self.sessions.read();
        if sessions.len() >= self.config.max_sessions {
            return Err(format!("maximum sessions ({}) reached", self.config.max_sessions));
        }
        drop(sessions);

        let now = now_secs();
        self.sessions.write().insert(
            id.clone(),
            SessionState {
                id: id.clone(),
                pubkey: None,
                subscriptions: HashMap::new(),
                created_at: now,
                last_activity: now,
            },
        );
        self.senders.write().insert(id.clone(), sender);
        info!(session = %id, "session registered");
        Ok(())
    }

    pub fn unregister(&self, id: &SessionId) {
        self.sessions.write().remove(id);
        self.senders.write().remove(id);
        info!(session = %id, "session unregistered");
    }

    pub fn set_authenticated(&self, id: &SessionId, pubkey: PubKey) {
        if let Some(state) = self.sessions.write().get_mut(id) {
            state.pubkey = Some(pubkey);
        }
    }

    pub fn pubkey_of(&self, id: &SessionId) -> Option<PubKey> {
        self.sessions.read().get(id)?.pubkey.clone()
    }

    pub fn subscribe(
        &self,
        id: &SessionId,
        subscription_id: String,
        filters: Vec<Filter>,
    ) -> Result<(), String> {
        let mut sessions = self.sessions.write();
        let state = sessions
            .get_mut(id)
            .ok_or_else(|| "session not found".to_string())?;

        if !state.subscriptions.contains_key(&subscription_id)
            && state.subscriptions.len() >= self.config.max_subscriptions_per_session
        {
            return Err(format!(
                "maximum subscriptions ({}) per session reached",
                self.config.max_subscriptions_per_session
            ));
        }

        state
            .subscriptions
            .insert(subscription_id, Subscription { filters });
        state.last_activity = now_secs();
        Ok(())
    }

    pub fn unsubscribe(&self, id: &SessionId, subscription_id: &str) {
        if let Some(state) = self.sessions.write().get_mut(id) {
            state.subscriptions.remove(subscription_id);
        }
    }

    pub fn update_activity(&self, id: &SessionId) {
        if let Some(state) = self.sessions.write().get_mut(id) {
            state.last_activity = now_secs();
        }
    }

    /// Deliver a frame to one session; `false` means the session's
    /// channel is gone (the sender task should stop feeding it).
    pub async fn send_to(&self, id: &SessionId, frame: ServerFrame) -> bool {
        let sender = { self.senders.read().get(id).cloned() };
        match sender {
            Some(sender) => sender.send(frame).await.is_ok(),
            None => false,
        }
    }

    /// Snapshot of every session id with its subscriptions, for the
    /// fan-out loop to evaluate filters against.
    pub fn snapshot(&self) -> Vec<(SessionId, SessionState)> {
        self.sessions
            .read()
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .map(|s| s.subscriptions.len())
            .sum()
    }

    pub fn cleanup_stale(&self) -> usize {
        let now = now_secs();
        let timeout = self.config.session_timeout_secs;
        let stale: Vec<SessionId> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|(_, state)| now.saturating_sub(state.last_activity) > timeout)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in &stale {
            self.unregister(id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "cleaned up stale sessions");
        }
        stale.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionRegistryConfig::default())
    }
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_subscribe_and_send() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::channel(8);
        registry.register("s1".to_string(), tx).unwrap();
        registry
            .subscribe(&"s1".to_string(), "sub1".to_string(), vec![])
            .unwrap();
        assert!(registry.send_to(&"s1".to_string(), ServerFrame::eose("sub1")).await);
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn subscription_limit_is_enforced() {
        let registry = SessionRegistry::new(SessionRegistryConfig {
            max_sessions: 10,
            max_subscriptions_per_session: 1,
            session_timeout_secs: 600,
        });
        let (tx, _rx) = mpsc::channel(8);
        registry.register("s1".to_string(), tx).unwrap();
        registry
            .subscribe(&"s1".to_string(), "sub1".to_string(), vec![])
            .unwrap();
        let err = registry.subscribe(&"s1".to_string(), "sub2".to_string(), vec![]);
        assert!(err.is_err());
    }

    #[test]
    fn unregister_removes_sender_and_state() {
        let registry = SessionRegistry::default();
        let (tx, _rx) = mpsc::channel(8);
        registry.register("s1".to_string(), tx).unwrap();
        registry.unregister(&"s1".to_string());
        assert_eq!(registry.session_count(), 0);
    }
}
