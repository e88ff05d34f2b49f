//! Submission gateway — maps a completed session onto the downstream
//! per-service create operation and classifies the outcome.
//!
//! Only `Unavailable` outcomes are retried, a bounded number of times with
//! a short backoff. Validation and conflict outcomes go straight back to
//! the engine so the user can correct their data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::flow::{ServiceKind, SubmissionRequest, SubmissionResult};

/// Backoff base between retries of an unavailable downstream.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Response shape of the downstream services API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Vec<String>>,
}

/// A failed call to the services API.
#[derive(Debug, thiserror::Error)]
pub enum ApiCallError {
    #[error("HTTP {status}")]
    Status {
        status: u16,
        body: Option<ApiResponse>,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),
}

/// The downstream per-service creation operation.
#[async_trait]
pub trait ServicesApi: Send + Sync {
    async fn create(
        &self,
        service: ServiceKind,
        record: &serde_json::Value,
    ) -> Result<ApiResponse, ApiCallError>;
}

/// HTTP client for the services API.
pub struct HttpServicesApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpServicesApi {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ServicesApi for HttpServicesApi {
    async fn create(
        &self,
        service: ServiceKind,
        record: &serde_json::Value,
    ) -> Result<ApiResponse, ApiCallError> {
        let url = format!("{}/api/{}", self.base_url, service.api_path());

        let resp = self
            .client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiCallError::Timeout
                } else {
                    ApiCallError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        let body: Option<ApiResponse> = resp.json().await.ok();

        if status.is_success() {
            body.ok_or_else(|| ApiCallError::Network("empty response body".to_string()))
        } else {
            Err(ApiCallError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// The submission gateway itself.
pub struct SubmissionGateway {
    api: Arc<dyn ServicesApi>,
    timeout: Duration,
    max_retries: u32,
}

impl SubmissionGateway {
    pub fn new(api: Arc<dyn ServicesApi>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            api,
            timeout,
            max_retries,
        }
    }

    /// Perform the downstream create call for a submission request.
    pub async fn submit(&self, request: &SubmissionRequest) -> SubmissionResult {
        let record = request.fields.to_record();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = self.call_once(request.service, &record).await;

            match &result {
                SubmissionResult::Unavailable { message } if attempt <= self.max_retries => {
                    warn!(
                        submission = %request.id,
                        service = %request.service,
                        attempt,
                        message,
                        "Submission unavailable; retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                SubmissionResult::Accepted { record_id } => {
                    info!(
                        submission = %request.id,
                        service = %request.service,
                        record_id = record_id.as_deref().unwrap_or("-"),
                        "Submission accepted"
                    );
                    return result;
                }
                _ => return result,
            }
        }
    }

    async fn call_once(
        &self,
        service: ServiceKind,
        record: &serde_json::Value,
    ) -> SubmissionResult {
        let call = self.api.create(service, record);
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => SubmissionResult::Unavailable {
                message: "request timed out".to_string(),
            },
            Ok(Ok(resp)) if resp.success => SubmissionResult::Accepted {
                record_id: extract_record_id(resp.data.as_ref()),
            },
            // A 200 with success=false is a schema rejection.
            Ok(Ok(resp)) => SubmissionResult::FieldValidation {
                messages: validation_messages(&resp),
            },
            Ok(Err(ApiCallError::Status { status, body })) => match status {
                400 | 422 => SubmissionResult::FieldValidation {
                    messages: body
                        .as_ref()
                        .map(validation_messages)
                        .unwrap_or_else(|| vec!["the application was rejected".to_string()]),
                },
                409 => SubmissionResult::Conflict {
                    message: body
                        .and_then(|b| b.message)
                        .unwrap_or_else(|| "a matching record already exists".to_string()),
                },
                _ => SubmissionResult::Unavailable {
                    message: format!("downstream returned HTTP {status}"),
                },
            },
            Ok(Err(ApiCallError::Timeout)) => SubmissionResult::Unavailable {
                message: "request timed out".to_string(),
            },
            Ok(Err(ApiCallError::Network(e))) => SubmissionResult::Unavailable { message: e },
        }
    }
}

fn validation_messages(resp: &ApiResponse) -> Vec<String> {
    match &resp.details {
        Some(details) if !details.is_empty() => details.clone(),
        _ => vec![
            resp.message
                .clone()
                .unwrap_or_else(|| "the application was rejected".to_string()),
        ],
    }
}

/// Pull a record id out of the downstream `data` object, whatever the
/// service chose to call it.
fn extract_record_id(data: Option<&serde_json::Value>) -> Option<String> {
    let data = data?;
    for key in ["id", "reference", "_id", "record_id"] {
        match data.get(key) {
            Some(serde_json::Value::String(s)) => return Some(s.clone()),
            Some(serde_json::Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use uuid::Uuid;

    use crate::fields::FieldBag;

    fn request() -> SubmissionRequest {
        let mut fields = FieldBag::new();
        fields.set("company_name", "Acme Ltd");
        fields.set("share_capital", "1000");
        SubmissionRequest {
            id: Uuid::new_v4(),
            service: ServiceKind::CompanyRegistration,
            sender_id: "+263771234567".to_string(),
            fields,
        }
    }

    /// Services-API double that replays a script of responses.
    struct ScriptedApi {
        calls: AtomicUsize,
        script: Mutex<Vec<Result<ApiResponse, ApiCallError>>>,
        seen_records: Mutex<Vec<serde_json::Value>>,
    }

    impl ScriptedApi {
        fn new(script: Vec<Result<ApiResponse, ApiCallError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script),
                seen_records: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ServicesApi for ScriptedApi {
        async fn create(
            &self,
            _service: ServiceKind,
            record: &serde_json::Value,
        ) -> Result<ApiResponse, ApiCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_records.lock().unwrap().push(record.clone());
            self.script.lock().unwrap().remove(0)
        }
    }

    fn ok_response(id: &str) -> ApiResponse {
        ApiResponse {
            success: true,
            data: Some(serde_json::json!({"id": id})),
            message: Some("created".to_string()),
            details: None,
        }
    }

    fn gateway(api: Arc<ScriptedApi>, retries: u32) -> SubmissionGateway {
        SubmissionGateway::new(api, Duration::from_secs(5), retries)
    }

    #[tokio::test]
    async fn success_carries_record_id_and_full_record() {
        let api = ScriptedApi::new(vec![Ok(ok_response("CR-1"))]);
        let result = gateway(Arc::clone(&api), 2).submit(&request()).await;

        assert!(matches!(
            result,
            SubmissionResult::Accepted { record_id: Some(ref id) } if id == "CR-1"
        ));
        let records = api.seen_records.lock().unwrap();
        assert_eq!(records[0]["company_name"], "Acme Ltd");
        assert_eq!(records[0]["share_capital"], "1000");
    }

    #[tokio::test]
    async fn unprocessable_status_is_field_validation() {
        let api = ScriptedApi::new(vec![Err(ApiCallError::Status {
            status: 422,
            body: Some(ApiResponse {
                success: false,
                data: None,
                message: Some("validation failed".to_string()),
                details: Some(vec!["share_capital must be at least 1".to_string()]),
            }),
        })]);
        let result = gateway(Arc::clone(&api), 2).submit(&request()).await;

        let SubmissionResult::FieldValidation { messages } = result else {
            panic!("expected field validation, got {result:?}");
        };
        assert_eq!(messages, vec!["share_capital must be at least 1"]);
        // Validation failures are never retried.
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_false_body_is_field_validation() {
        let api = ScriptedApi::new(vec![Ok(ApiResponse {
            success: false,
            data: None,
            message: Some("company name is taken".to_string()),
            details: None,
        })]);
        let result = gateway(api, 2).submit(&request()).await;

        let SubmissionResult::FieldValidation { messages } = result else {
            panic!("expected field validation, got {result:?}");
        };
        assert_eq!(messages, vec!["company name is taken"]);
    }

    #[tokio::test]
    async fn conflict_status_is_conflict() {
        let api = ScriptedApi::new(vec![Err(ApiCallError::Status {
            status: 409,
            body: Some(ApiResponse {
                success: false,
                data: None,
                message: Some("duplicate registration".to_string()),
                details: None,
            }),
        })]);
        let result = gateway(Arc::clone(&api), 2).submit(&request()).await;

        assert!(matches!(
            result,
            SubmissionResult::Conflict { ref message } if message == "duplicate registration"
        ));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_retries_then_succeeds() {
        let api = ScriptedApi::new(vec![
            Err(ApiCallError::Network("connection refused".to_string())),
            Err(ApiCallError::Status {
                status: 503,
                body: None,
            }),
            Ok(ok_response("CR-2")),
        ]);
        let result = gateway(Arc::clone(&api), 2).submit(&request()).await;

        assert!(result.is_success());
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unavailable_exhausts_retries() {
        let api = ScriptedApi::new(vec![
            Err(ApiCallError::Timeout),
            Err(ApiCallError::Timeout),
            Err(ApiCallError::Timeout),
        ]);
        let result = gateway(Arc::clone(&api), 2).submit(&request()).await;

        assert!(matches!(result, SubmissionResult::Unavailable { .. }));
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_downstream_times_out_as_unavailable() {
        struct SlowApi;

        #[async_trait]
        impl ServicesApi for SlowApi {
            async fn create(
                &self,
                _service: ServiceKind,
                _record: &serde_json::Value,
            ) -> Result<ApiResponse, ApiCallError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ApiResponse {
                    success: true,
                    data: None,
                    message: None,
                    details: None,
                })
            }
        }

        let gateway = SubmissionGateway::new(Arc::new(SlowApi), Duration::from_millis(10), 0);
        let result = gateway.submit(&request()).await;
        assert!(matches!(result, SubmissionResult::Unavailable { .. }));
    }

    #[test]
    fn record_id_extraction_handles_shapes() {
        assert_eq!(
            extract_record_id(Some(&serde_json::json!({"id": "abc"}))),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_record_id(Some(&serde_json::json!({"reference": 42}))),
            Some("42".to_string())
        );
        assert_eq!(extract_record_id(Some(&serde_json::json!({"name": "x"}))), None);
        assert_eq!(extract_record_id(None), None);
    }
}
