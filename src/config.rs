//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Port for the webhook/introspection HTTP server.
    pub http_port: u16,
    /// Token expected on the webhook verification handshake.
    pub verify_token: String,
    /// WhatsApp Cloud API access token.
    pub whatsapp_token: SecretString,
    /// WhatsApp phone number id (the sender identity).
    pub phone_number_id: String,
    /// Base URL of the WhatsApp Graph API.
    pub graph_api_base: String,
    /// Base URL of the downstream services API.
    pub services_api_base: String,
    /// Operator chat id for admin notifications, if configured.
    pub admin_chat_id: Option<String>,
    /// Session idle timeout (sessions are expired after this duration).
    pub session_ttl: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
    /// Timeout for a single outbound send attempt.
    pub delivery_timeout: Duration,
    /// Timeout for a single downstream create call.
    pub submit_timeout: Duration,
    /// Automatic retries for unavailable downstream submissions.
    pub submit_retries: u32,
    /// Session database path. `None` keeps sessions in memory.
    pub db_path: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            verify_token: "regdesk".to_string(),
            whatsapp_token: SecretString::from(String::new()),
            phone_number_id: String::new(),
            graph_api_base: "https://graph.facebook.com/v19.0".to_string(),
            services_api_base: "http://localhost:3000".to_string(),
            admin_chat_id: None,
            session_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(15),
            submit_retries: 2,
            db_path: None,
        }
    }
}

impl BotConfig {
    /// Build a config from environment variables.
    ///
    /// Required: `WHATSAPP_TOKEN`, `WHATSAPP_PHONE_NUMBER_ID`,
    /// `WEBHOOK_VERIFY_TOKEN`, `SERVICES_API_BASE`. Everything else falls
    /// back to the defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let whatsapp_token = require_env("WHATSAPP_TOKEN")?;
        let phone_number_id = require_env("WHATSAPP_PHONE_NUMBER_ID")?;
        let verify_token = require_env("WEBHOOK_VERIFY_TOKEN")?;
        let services_api_base = require_env("SERVICES_API_BASE")?;

        Ok(Self {
            http_port: env_parse("REGDESK_PORT", defaults.http_port)?,
            verify_token,
            whatsapp_token: SecretString::from(whatsapp_token),
            phone_number_id,
            graph_api_base: std::env::var("GRAPH_API_BASE")
                .unwrap_or(defaults.graph_api_base),
            services_api_base,
            admin_chat_id: std::env::var("REGDESK_ADMIN_CHAT").ok(),
            session_ttl: Duration::from_secs(env_parse(
                "REGDESK_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
            sweep_interval: Duration::from_secs(env_parse(
                "REGDESK_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            delivery_timeout: Duration::from_secs(env_parse(
                "REGDESK_DELIVERY_TIMEOUT_SECS",
                defaults.delivery_timeout.as_secs(),
            )?),
            submit_timeout: Duration::from_secs(env_parse(
                "REGDESK_SUBMIT_TIMEOUT_SECS",
                defaults.submit_timeout.as_secs(),
            )?),
            submit_retries: env_parse("REGDESK_SUBMIT_RETRIES", defaults.submit_retries)?,
            db_path: std::env::var("REGDESK_DB_PATH").ok().map(PathBuf::from),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.session_ttl, Duration::from_secs(1800));
        assert!(cfg.sweep_interval < cfg.session_ttl);
        assert_eq!(cfg.submit_retries, 2);
        assert!(cfg.db_path.is_none());
    }
}
