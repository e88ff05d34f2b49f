//! Session model — per-sender progress against the flow definition.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::FieldBag;
use crate::flow::{NodeId, ServiceKind};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    AwaitingConfirmation,
    Submitted,
    Expired,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Submitted => "submitted",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// One conversational participant's state. Keyed by sender id (phone number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub sender_id: String,
    pub current_node: NodeId,
    pub service: Option<ServiceKind>,
    pub fields: FieldBag,
    /// Previously visited node ids, oldest first. Enables "edit".
    pub history: Vec<NodeId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    /// A fresh session parked at the root node.
    pub fn new(sender_id: impl Into<String>, root: NodeId, now: DateTime<Utc>) -> Self {
        Self {
            sender_id: sender_id.into(),
            current_node: root,
            service: None,
            fields: FieldBag::new(),
            history: Vec::new(),
            created_at: now,
            last_activity_at: now,
            status: SessionStatus::Active,
        }
    }

    /// Return the session to the root state, clearing all progress.
    pub fn reset_to(&mut self, root: &NodeId, now: DateTime<Utc>) {
        self.current_node = root.clone();
        self.service = None;
        self.fields.clear();
        self.history.clear();
        self.last_activity_at = now;
        self.status = SessionStatus::Active;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Whether the session has been idle longer than `ttl`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let idle = now.signed_duration_since(self.last_activity_at);
        idle.to_std().map(|idle| idle > ttl).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_at_root() {
        let now = Utc::now();
        let s = Session::new("+263771234567", "root".to_string(), now);
        assert_eq!(s.current_node, "root");
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.fields.is_empty());
        assert!(s.history.is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let now = Utc::now();
        let mut s = Session::new("+263771234567", "root".to_string(), now);
        s.current_node = "company.email".to_string();
        s.service = Some(ServiceKind::CompanyRegistration);
        s.fields.set("full_name", "Tendai Moyo");
        s.history.push("root".to_string());
        s.status = SessionStatus::AwaitingConfirmation;

        s.reset_to(&"root".to_string(), now);

        assert_eq!(s.current_node, "root");
        assert!(s.service.is_none());
        assert!(s.fields.is_empty());
        assert!(s.history.is_empty());
        assert_eq!(s.status, SessionStatus::Active);
    }

    #[test]
    fn staleness_respects_ttl() {
        let now = Utc::now();
        let mut s = Session::new("x", "root".to_string(), now);
        s.last_activity_at = now - chrono::Duration::minutes(31);

        assert!(s.is_stale(now, Duration::from_secs(30 * 60)));
        assert!(!s.is_stale(now, Duration::from_secs(60 * 60)));
    }

    #[test]
    fn future_activity_is_not_stale() {
        let now = Utc::now();
        let mut s = Session::new("x", "root".to_string(), now);
        s.last_activity_at = now + chrono::Duration::minutes(5);
        assert!(!s.is_stale(now, Duration::from_secs(1)));
    }

    #[test]
    fn serde_roundtrip() {
        let now = Utc::now();
        let mut s = Session::new("+263771234567", "root".to_string(), now);
        s.fields.set("full_name", "Tendai Moyo");
        s.status = SessionStatus::AwaitingConfirmation;

        let json = serde_json::to_string(&s).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sender_id, s.sender_id);
        assert_eq!(parsed.status, SessionStatus::AwaitingConfirmation);
        assert_eq!(parsed.fields.get("full_name"), Some("Tendai Moyo"));
    }
}
