//! Delivery adapter — rich-template send with a single plain-text fallback.
//!
//! A template directive gets at most two attempts: the template itself, then
//! the plain-text fallback. Plain-text directives get exactly one attempt.
//! A delivery counts as failed only when every attempt failed.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{DeliveryError, TransportError};
use crate::flow::{DirectiveKind, ResponseDirective};
use crate::delivery::transport::Transport;

/// Which path a delivery ultimately succeeded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    Template,
    PlainText,
}

/// A successful delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub path: DeliveryPath,
    pub message_id: String,
}

/// Turns a `ResponseDirective` into at most two bounded send attempts.
pub struct DeliveryAdapter {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl DeliveryAdapter {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub async fn deliver(
        &self,
        recipient: &str,
        directive: &ResponseDirective,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let template_error = match &directive.kind {
            DirectiveKind::Template {
                template_id,
                variables,
            } => {
                let attempt = tokio::time::timeout(
                    self.timeout,
                    self.transport.send_template(recipient, template_id, variables),
                )
                .await;

                match attempt {
                    Ok(Ok(message_id)) => {
                        return Ok(DeliveryReceipt {
                            path: DeliveryPath::Template,
                            message_id,
                        });
                    }
                    Ok(Err(err)) => {
                        warn!(recipient, template_id, %err, "Template send failed; falling back to text");
                        Some(err)
                    }
                    Err(_) => {
                        warn!(recipient, template_id, "Template send timed out; falling back to text");
                        Some(TransportError::Timeout(self.timeout))
                    }
                }
            }
            DirectiveKind::PlainText => None,
        };

        let attempt = tokio::time::timeout(
            self.timeout,
            self.transport.send_text(recipient, &directive.plain_text),
        )
        .await;

        let text_error = match attempt {
            Ok(Ok(message_id)) => {
                return Ok(DeliveryReceipt {
                    path: DeliveryPath::PlainText,
                    message_id,
                });
            }
            Ok(Err(err)) => err,
            Err(_) => TransportError::Timeout(self.timeout),
        };

        match template_error {
            Some(template) => Err(DeliveryError::BothAttemptsFailed {
                template: template.to_string(),
                text: text_error.to_string(),
            }),
            None => Err(DeliveryError::TextFailed(text_error)),
        }
    }
}
