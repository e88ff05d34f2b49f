//! Session-store contract and the per-sender lock registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::session::model::Session;

/// Backend-agnostic storage of per-sender conversational state.
///
/// Implementations do not serialize access themselves: the caller holds the
/// per-sender lock from [`SessionLocks`] across a `load`…`save` span, so no
/// two in-flight messages for the same sender can interleave transitions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for a sender, lazily creating one at the root.
    ///
    /// A session that is marked expired, or whose idle time exceeds the
    /// store's TTL, is transparently reset to the root before it is
    /// returned — expiry is never surfaced to the user.
    async fn load(&self, sender_id: &str) -> Result<Session, StoreError>;

    /// Look up a session without creating one (introspection).
    async fn get(&self, sender_id: &str) -> Result<Option<Session>, StoreError>;

    /// Persist a session.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Force a session back to the root state. Creates one if absent.
    async fn reset(&self, sender_id: &str) -> Result<Session, StoreError>;

    /// All sessions, for introspection.
    async fn list(&self) -> Result<Vec<Session>, StoreError>;

    /// Mark sessions idle for longer than `ttl` as expired. Returns the
    /// number of sessions transitioned.
    async fn expire_stale(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize, StoreError>;
}

/// Per-sender mutual exclusion.
///
/// `acquire` returns a guard that must be held across the load → advance →
/// save span for that sender. Messages from different senders proceed
/// independently.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, sender_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(
                map.entry(sender_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_sender_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("+263771234567").await;
                let in_flight = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                max_seen.fetch_max(in_flight, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_senders_are_independent() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("sender-a").await;
        // Must not deadlock: a different sender's lock is free.
        let _b = locks.acquire("sender-b").await;
    }
}
