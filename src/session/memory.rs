//! In-memory session store — the default backend and the reference for the
//! store contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::flow::NodeId;
use crate::session::model::{Session, SessionStatus};
use crate::session::store::SessionStore;

/// Session store backed by a process-local map.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    root: NodeId,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(root: NodeId, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            root,
            ttl,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, sender_id: &str) -> Result<Session, StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(sender_id.to_string())
            .or_insert_with(|| Session::new(sender_id, self.root.clone(), now));

        if session.status == SessionStatus::Expired || session.is_stale(now, self.ttl) {
            debug!(sender_id, "Resetting expired session on access");
            session.reset_to(&self.root, now);
        }
        Ok(session.clone())
    }

    async fn get(&self, sender_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(sender_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.sender_id.clone(), session.clone());
        Ok(())
    }

    async fn reset(&self, sender_id: &str) -> Result<Session, StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(sender_id.to_string())
            .or_insert_with(|| Session::new(sender_id, self.root.clone(), now));
        session.reset_to(&self.root, now);
        Ok(session.clone())
    }

    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(sessions)
    }

    async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.status != SessionStatus::Expired && session.is_stale(now, ttl) {
                session.status = SessionStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new("root".to_string(), Duration::from_secs(1800))
    }

    #[tokio::test]
    async fn load_creates_at_root() {
        let store = store();
        let s = store.load("+263771234567").await.unwrap();
        assert_eq!(s.current_node, "root");
        assert_eq!(s.status, SessionStatus::Active);

        // Same sender loads the same session.
        let again = store.load("+263771234567").await.unwrap();
        assert_eq!(again.created_at, s.created_at);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_does_not_create() {
        let store = store();
        assert!(store.get("unseen").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_reload_roundtrip() {
        let store = store();
        let mut s = store.load("x").await.unwrap();
        s.current_node = "company.email".to_string();
        s.fields.set("full_name", "Tendai Moyo");
        store.save(&s).await.unwrap();

        let loaded = store.load("x").await.unwrap();
        assert_eq!(loaded.current_node, "company.email");
        assert_eq!(loaded.fields.get("full_name"), Some("Tendai Moyo"));
    }

    #[tokio::test]
    async fn reset_returns_to_root_regardless_of_state() {
        let store = store();
        let mut s = store.load("x").await.unwrap();
        s.current_node = "company.confirm".to_string();
        s.status = SessionStatus::Submitted;
        s.fields.set("full_name", "Tendai Moyo");
        store.save(&s).await.unwrap();

        let reset = store.reset("x").await.unwrap();
        assert_eq!(reset.current_node, "root");
        assert!(reset.fields.is_empty());
        assert_eq!(reset.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn expire_stale_marks_idle_sessions() {
        let store = store();
        let mut stale = store.load("stale").await.unwrap();
        stale.last_activity_at = Utc::now() - chrono::Duration::hours(2);
        store.save(&stale).await.unwrap();
        store.load("fresh").await.unwrap();

        let expired = store
            .expire_stale(Utc::now(), Duration::from_secs(1800))
            .await
            .unwrap();

        assert_eq!(expired, 1);
        let stale = store.get("stale").await.unwrap().unwrap();
        assert_eq!(stale.status, SessionStatus::Expired);
        let fresh = store.get("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn expired_session_resets_on_next_load() {
        let store = store();
        let mut s = store.load("x").await.unwrap();
        s.current_node = "company.email".to_string();
        s.fields.set("full_name", "Tendai Moyo");
        s.last_activity_at = Utc::now() - chrono::Duration::hours(2);
        store.save(&s).await.unwrap();
        store
            .expire_stale(Utc::now(), Duration::from_secs(1800))
            .await
            .unwrap();

        let reloaded = store.load("x").await.unwrap();
        assert_eq!(reloaded.current_node, "root");
        assert!(reloaded.fields.is_empty());
        assert_eq!(reloaded.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn distinct_senders_never_observe_each_other() {
        let store = std::sync::Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let sender = format!("sender-{i}");
                let mut s = store.load(&sender).await.unwrap();
                s.fields.set("full_name", format!("User {i}"));
                store.save(&s).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10 {
            let s = store.get(&format!("sender-{i}")).await.unwrap().unwrap();
            assert_eq!(s.fields.get("full_name"), Some(format!("User {i}").as_str()));
        }
    }
}
