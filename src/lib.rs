//! RegDesk — a WhatsApp intake bot for business-registration services.
//!
//! Inbound messages drive a per-sender session through a validated flow
//! definition; completed applications are submitted to the downstream
//! services API and the classified outcome is relayed back to the user.

pub mod config;
pub mod delivery;
pub mod error;
pub mod fields;
pub mod flow;
pub mod gateway;
pub mod server;
pub mod session;

pub use error::{Error, Result};
