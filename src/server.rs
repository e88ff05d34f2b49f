//! HTTP surface — the WhatsApp webhook plus session introspection routes.
//!
//! `POST /webhook` acknowledges immediately and processes each inbound
//! message on its own task, holding the per-sender lock across the
//! load → advance → save span.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::delivery::{DeliveryAdapter, Transport};
use crate::error::Error;
use crate::fields::format;
use crate::flow::FlowEngine;
use crate::gateway::SubmissionGateway;
use crate::session::{SessionLocks, SessionStore};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: FlowEngine,
    pub store: Arc<dyn SessionStore>,
    pub locks: Arc<SessionLocks>,
    pub delivery: Arc<DeliveryAdapter>,
    pub gateway: Arc<SubmissionGateway>,
    pub transport: Arc<dyn Transport>,
    pub admin_chat_id: Option<String>,
    pub verify_token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{sender_id}", get(get_session))
        .route("/api/sessions/{sender_id}/reset", post(reset_session))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically mark idle sessions as expired.
pub fn spawn_expiry_sweep(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    ttl: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match store.expire_stale(Utc::now(), ttl).await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "Expired idle sessions"),
                Err(e) => warn!(error = %e, "Session expiry sweep failed"),
            }
        }
    })
}

// ── Webhook ─────────────────────────────────────────────────────────

/// Meta's subscription handshake: echo `hub.challenge` when the verify
/// token matches.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned();

    if mode == Some("subscribe") && token == Some(state.verify_token.as_str()) {
        (StatusCode::OK, challenge.unwrap_or_default()).into_response()
    } else {
        warn!("Webhook verification failed");
        StatusCode::FORBIDDEN.into_response()
    }
}

async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    // Ack immediately; the batch is processed off the request task.
    tokio::spawn(async move {
        process_payload(&state, &payload).await;
    });
    // Always 200: a non-2xx makes Meta retry the whole batch.
    StatusCode::OK
}

/// Handle every message in a webhook payload, sequentially.
///
/// A batch can carry several messages from one sender; awaiting them in
/// extraction order keeps per-sender processing in receipt order instead
/// of racing spawned tasks for the sender lock.
pub async fn process_payload(state: &AppState, payload: &serde_json::Value) {
    for inbound in extract_inbound(payload) {
        if let Err(e) = handle_message(state, &inbound.from, &inbound.text).await {
            error!(sender = inbound.from, error = %e, "Failed to handle inbound message");
        }
    }
}

#[derive(Debug, PartialEq)]
struct InboundMessage {
    from: String,
    text: String,
}

/// Pull the text messages out of a webhook payload.
///
/// Accepts both the full Meta envelope and a flat `{from, text}` object
/// (used by local tooling). Delivery-status callbacks and non-text
/// messages are ignored.
fn extract_inbound(payload: &serde_json::Value) -> Vec<InboundMessage> {
    if let (Some(from), Some(text)) = (
        payload.get("from").and_then(|v| v.as_str()),
        payload.get("text").and_then(|v| v.as_str()),
    ) {
        return vec![InboundMessage {
            from: from.to_string(),
            text: text.to_string(),
        }];
    }

    let mut out = Vec::new();
    let entries = payload.get("entry").and_then(|v| v.as_array());
    for entry in entries.into_iter().flatten() {
        let changes = entry.get("changes").and_then(|v| v.as_array());
        for change in changes.into_iter().flatten() {
            let messages = change
                .pointer("/value/messages")
                .and_then(|v| v.as_array());
            for message in messages.into_iter().flatten() {
                if message.get("type").and_then(|v| v.as_str()) != Some("text") {
                    continue;
                }
                let from = message.get("from").and_then(|v| v.as_str());
                let body = message.pointer("/text/body").and_then(|v| v.as_str());
                if let (Some(from), Some(body)) = (from, body) {
                    out.push(InboundMessage {
                        from: from.to_string(),
                        text: body.to_string(),
                    });
                }
            }
        }
    }
    out
}

/// Process one inbound message end to end.
///
/// Exactly one outbound delivery happens per inbound message: when the
/// transition produced a submission, only the resolved outcome directive
/// is sent, never the intermediate one.
pub async fn handle_message(state: &AppState, from: &str, text: &str) -> Result<(), Error> {
    let _guard = state.locks.acquire(from).await;

    let mut session = state.store.load(from).await?;
    let mut directive = state.engine.advance(&mut session, text)?;

    if let Some(request) = directive.submission.take() {
        let result = state.gateway.submit(&request).await;

        if let crate::flow::SubmissionResult::Accepted { record_id } = &result {
            notify_admin(state, &request, record_id.as_deref()).await;
        }

        directive = state.engine.resolve_submission(&mut session, &result)?;
    }

    state.store.save(&session).await?;

    state.delivery.deliver(from, &directive).await?;
    info!(
        sender = from,
        node = session.current_node,
        "Handled inbound message"
    );
    Ok(())
}

/// Best-effort relay of an accepted application to the operator chat.
async fn notify_admin(
    state: &AppState,
    request: &crate::flow::SubmissionRequest,
    record_id: Option<&str>,
) {
    let Some(admin_chat) = &state.admin_chat_id else {
        return;
    };
    let note = format::admin_notification(request.service, &request.sender_id, &request.fields, record_id);
    if let Err(e) = state.transport.send_text(admin_chat, &note).await {
        warn!(error = %e, "Failed to notify admin chat");
    }
}

// ── Introspection ───────────────────────────────────────────────────

async fn list_sessions(State(state): State<AppState>) -> Response {
    match state.store.list().await {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(sender_id): Path<String>,
) -> Response {
    match state.store.get(&sender_id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "no session for sender"})),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn reset_session(
    State(state): State<AppState>,
    Path(sender_id): Path<String>,
) -> Response {
    match state.store.reset(&sender_id).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_flat_shape() {
        let payload = serde_json::json!({"from": "+263771234567", "text": "1"});
        let inbound = extract_inbound(&payload);
        assert_eq!(
            inbound,
            vec![InboundMessage {
                from: "+263771234567".to_string(),
                text: "1".to_string(),
            }]
        );
    }

    #[test]
    fn extracts_meta_envelope() {
        let payload = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [{
                            "from": "263771234567",
                            "id": "wamid.abc",
                            "type": "text",
                            "text": {"body": "hello"}
                        }]
                    }
                }]
            }]
        });
        let inbound = extract_inbound(&payload);
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].from, "263771234567");
        assert_eq!(inbound[0].text, "hello");
    }

    #[test]
    fn ignores_status_callbacks_and_media() {
        let payload = serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{"id": "wamid.abc", "status": "delivered"}],
                        "messages": [{
                            "from": "263771234567",
                            "type": "image",
                            "image": {"id": "media-1"}
                        }]
                    }
                }]
            }]
        });
        assert!(extract_inbound(&payload).is_empty());
    }

    #[test]
    fn malformed_payload_yields_nothing() {
        assert!(extract_inbound(&serde_json::json!({"entry": "nope"})).is_empty());
        assert!(extract_inbound(&serde_json::json!(null)).is_empty());
        assert!(extract_inbound(&serde_json::json!({"text": 42})).is_empty());
    }
}
