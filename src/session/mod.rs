//! Per-sender session state and its storage backends.

pub mod libsql;
pub mod memory;
pub mod model;
pub mod store;

pub use libsql::LibSqlSessionStore;
pub use memory::InMemorySessionStore;
pub use model::{Session, SessionStatus};
pub use store::{SessionLocks, SessionStore};
