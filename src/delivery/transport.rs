//! WhatsApp Cloud API transport.
//!
//! Thin client over the Graph API `/{phone_number_id}/messages` endpoint,
//! behind the `Transport` trait so the adapter and tests can swap it out.

use std::collections::BTreeMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::TransportError;

/// Maximum body length for a WhatsApp text message.
const WHATSAPP_MAX_TEXT_LENGTH: usize = 4096;

/// Outbound message transport. Returns the provider's message id on success.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_template(
        &self,
        to: &str,
        template_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, TransportError>;

    async fn send_text(&self, to: &str, body: &str) -> Result<String, TransportError>;
}

/// WhatsApp Cloud API client.
pub struct WhatsAppTransport {
    client: reqwest::Client,
    token: SecretString,
    phone_number_id: String,
    api_base: String,
}

impl WhatsAppTransport {
    pub fn new(token: SecretString, phone_number_id: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            phone_number_id,
            api_base,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    async fn post_message(
        &self,
        payload: &serde_json::Value,
    ) -> Result<String, TransportError> {
        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(self.token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            // The Graph API reports unknown templates as error 132001.
            if body.contains("132001") || body.to_lowercase().contains("template") {
                let template_name = payload
                    .pointer("/template/name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                return Err(TransportError::InvalidTemplate(template_name.to_string()));
            }
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let message_id = data
            .pointer("/messages/0/id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(message_id)
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    async fn send_template(
        &self,
        to: &str,
        template_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, TransportError> {
        let parameters: Vec<serde_json::Value> = variables
            .values()
            .map(|value| serde_json::json!({"type": "text", "text": value}))
            .collect();

        let mut template = serde_json::json!({
            "name": template_id,
            "language": {"code": "en"},
        });
        if !parameters.is_empty() {
            template["components"] =
                serde_json::json!([{"type": "body", "parameters": parameters}]);
        }

        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": template,
        });

        let id = self.post_message(&payload).await?;
        tracing::debug!(to, template_id, "WhatsApp template sent");
        Ok(id)
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, TransportError> {
        // Split long messages; report the last chunk's id.
        let chunks = split_message(body, WHATSAPP_MAX_TEXT_LENGTH);
        let mut last_id = String::new();

        for chunk in &chunks {
            let payload = serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": {"body": chunk},
            });
            last_id = self.post_message(&payload).await?;
        }

        tracing::debug!(to, chunks = chunks.len(), "WhatsApp text sent");
        Ok(last_id)
    }
}

/// Split a message into chunks that fit the transport's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // max_len is a byte index and may land inside a multi-byte char;
        // walk back to a boundary before slicing.
        let mut end = max_len;
        while end > 0 && !remaining.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }

        let chunk = &remaining[..end];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(end);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { end } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
