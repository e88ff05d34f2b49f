//! Engine output types — what to send back, and what side effect to run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fields::FieldBag;
use crate::flow::node::ServiceKind;

/// How the outbound message should be delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DirectiveKind {
    /// Rich template send, with plain-text fallback on failure.
    Template {
        template_id: String,
        variables: BTreeMap<String, String>,
    },
    /// Plain text only.
    PlainText,
}

/// A submission the caller must perform against the downstream services API.
///
/// The engine never performs the call itself — it hands this to the webhook
/// handler so the side effect stays outside the transition logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Correlation id for logging.
    pub id: Uuid,
    pub service: ServiceKind,
    pub sender_id: String,
    pub fields: FieldBag,
}

/// Classified outcome of a submission, reported back to the engine by the
/// caller after performing the `SubmissionRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SubmissionResult {
    /// Downstream accepted the record.
    Accepted { record_id: Option<String> },
    /// Downstream schema validation rejected one or more fields.
    FieldValidation { messages: Vec<String> },
    /// A matching record already exists downstream.
    Conflict { message: String },
    /// Transport failure or downstream outage; retriable.
    Unavailable { message: String },
}

impl SubmissionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// The engine's description of what to send back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDirective {
    pub kind: DirectiveKind,
    /// Always present: the fallback body for templates, the whole body
    /// for plain text.
    pub plain_text: String,
    /// Present when the transition passed through a `Submit` node.
    pub submission: Option<SubmissionRequest>,
}

impl ResponseDirective {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: DirectiveKind::PlainText,
            plain_text: text.into(),
            submission: None,
        }
    }

    pub fn template(
        template_id: impl Into<String>,
        variables: BTreeMap<String, String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            kind: DirectiveKind::Template {
                template_id: template_id.into(),
                variables,
            },
            plain_text: fallback.into(),
            submission: None,
        }
    }

    pub fn with_submission(mut self, submission: SubmissionRequest) -> Self {
        self.submission = Some(submission);
        self
    }

    pub fn is_template(&self) -> bool {
        matches!(self.kind, DirectiveKind::Template { .. })
    }
}
