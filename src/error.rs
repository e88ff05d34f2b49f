//! Error types for RegDesk.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Flow definition error: {0}")]
    Flow(#[from] FlowError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Flow-definition errors.
///
/// All of these are structural problems caught when the definition is built
/// at startup, except `UnknownNode`, which guards node lookups at runtime.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node {node} references missing target {target}")]
    MissingTarget { node: String, target: String },

    #[error("Root node {0} must be a menu")]
    RootNotMenu(String),

    #[error("Node {0} is unreachable from the root")]
    Unreachable(String),

    #[error("Node {0} cannot reach a submit or terminal node")]
    NoExit(String),

    #[error("Unknown node id: {0}")]
    UnknownNode(String),

    #[error("Node {0} is not a submit node")]
    NotSubmit(String),
}

/// Session-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Failed to serialize session state: {0}")]
    Serialization(String),
}

/// Outbound transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Template {0} was rejected by the transport")]
    InvalidTemplate(String),

    #[error("Transport returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// Delivery-adapter errors. Only raised when the plain-text path fails —
/// a failed template attempt alone is resolved by the fallback.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Both delivery attempts failed (template: {template}, text: {text})")]
    BothAttemptsFailed { template: String, text: String },

    #[error("Plain-text delivery failed: {0}")]
    TextFailed(#[from] TransportError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
