//! libSQL session store — persistent backend using libsql's async API.
//!
//! The full session is stored as a JSON `state` column; `status` and
//! `last_activity` are mirrored into their own columns so the expiry sweep
//! can query without deserializing every row.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::flow::NodeId;
use crate::session::model::{Session, SessionStatus};
use crate::session::store::SessionStore;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "sessions_table",
    sql: r#"
        CREATE TABLE IF NOT EXISTS sessions (
            sender_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            status TEXT NOT NULL,
            last_activity TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_last_activity ON sessions(last_activity);
    "#,
}];

/// libSQL session backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlSessionStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    root: NodeId,
    ttl: Duration,
}

impl LibSqlSessionStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn open(path: &Path, root: NodeId, ttl: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            root,
            ttl,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Session database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn open_memory(root: NodeId, ttl: Duration) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            root,
            ttl,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    version INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Migration table: {e}")))?;

        let current = {
            let mut rows = self
                .conn
                .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
                .await
                .map_err(|e| StoreError::Backend(format!("Migration version: {e}")))?;
            match rows
                .next()
                .await
                .map_err(|e| StoreError::Backend(format!("Migration version: {e}")))?
            {
                Some(row) => row
                    .get::<i64>(0)
                    .map_err(|e| StoreError::Backend(format!("Migration version: {e}")))?,
                None => 0,
            }
        };

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            debug!(version = migration.version, name = migration.name, "Applying migration");
            self.conn
                .execute_batch(migration.sql)
                .await
                .map_err(|e| {
                    StoreError::Backend(format!("Migration {} failed: {e}", migration.name))
                })?;
            self.conn
                .execute(
                    "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                    params![migration.version, migration.name, Utc::now().to_rfc3339()],
                )
                .await
                .map_err(|e| {
                    StoreError::Backend(format!("Migration {} record: {e}", migration.name))
                })?;
        }
        Ok(())
    }

    async fn fetch(&self, sender_id: &str) -> Result<Option<Session>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT state FROM sessions WHERE sender_id = ?1",
                params![sender_id],
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?
        {
            Some(row) => {
                let state: String = row
                    .get(0)
                    .map_err(|e| StoreError::Backend(format!("Row read failed: {e}")))?;
                let session = serde_json::from_str(&state)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, session: &Session) -> Result<(), StoreError> {
        let state = serde_json::to_string(session)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO sessions (sender_id, state, status, last_activity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(sender_id) DO UPDATE SET
                    state = excluded.state,
                    status = excluded.status,
                    last_activity = excluded.last_activity",
                params![
                    session.sender_id.as_str(),
                    state,
                    session.status.to_string(),
                    session.last_activity_at.to_rfc3339(),
                    session.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Upsert failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for LibSqlSessionStore {
    async fn load(&self, sender_id: &str) -> Result<Session, StoreError> {
        let now = Utc::now();
        let mut session = match self.fetch(sender_id).await? {
            Some(session) => session,
            None => Session::new(sender_id, self.root.clone(), now),
        };

        if session.status == SessionStatus::Expired || session.is_stale(now, self.ttl) {
            debug!(sender_id, "Resetting expired session on access");
            session.reset_to(&self.root, now);
        }
        self.upsert(&session).await?;
        Ok(session)
    }

    async fn get(&self, sender_id: &str) -> Result<Option<Session>, StoreError> {
        self.fetch(sender_id).await
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.upsert(session).await
    }

    async fn reset(&self, sender_id: &str) -> Result<Session, StoreError> {
        let now = Utc::now();
        let mut session = match self.fetch(sender_id).await? {
            Some(session) => session,
            None => Session::new(sender_id, self.root.clone(), now),
        };
        session.reset_to(&self.root, now);
        self.upsert(&session).await?;
        Ok(session)
    }

    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT state FROM sessions ORDER BY last_activity DESC",
                (),
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?
        {
            let state: String = row
                .get(0)
                .map_err(|e| StoreError::Backend(format!("Row read failed: {e}")))?;
            sessions.push(
                serde_json::from_str(&state)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            );
        }
        Ok(sessions)
    }

    async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<usize, StoreError> {
        let cutoff = now
            - chrono::Duration::from_std(ttl)
                .map_err(|e| StoreError::Backend(format!("Invalid TTL: {e}")))?;

        let stale: Vec<Session> = {
            let mut rows = self
                .conn
                .query(
                    "SELECT state FROM sessions
                     WHERE status != 'expired' AND last_activity < ?1",
                    params![cutoff.to_rfc3339()],
                )
                .await
                .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?;

            let mut sessions = Vec::new();
            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| StoreError::Backend(format!("Query failed: {e}")))?
            {
                let state: String = row
                    .get(0)
                    .map_err(|e| StoreError::Backend(format!("Row read failed: {e}")))?;
                sessions.push(
                    serde_json::from_str::<Session>(&state)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                );
            }
            sessions
        };

        let mut expired = 0;
        for mut session in stale {
            session.status = SessionStatus::Expired;
            self.upsert(&session).await?;
            expired += 1;
        }
        Ok(expired)
    }
}
