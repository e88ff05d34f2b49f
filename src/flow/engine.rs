//! The conversation-flow engine.
//!
//! `advance` interprets one inbound message against the session's current
//! node and returns the outbound directive. The engine's transition logic is
//! synchronous and side-effect free: submissions are handed back to the
//! caller as a `SubmissionRequest`, and the caller reports the outcome via
//! `resolve_submission`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::FlowError;
use crate::fields::format;
use crate::flow::definition::FlowDefinition;
use crate::flow::directive::{ResponseDirective, SubmissionRequest, SubmissionResult};
use crate::flow::node::{FlowNode, NodeKind, ServiceKind};
use crate::session::{Session, SessionStatus};

const CONFIRM_KEYWORDS: &[&str] = &["confirm", "yes", "y"];
const EDIT_KEYWORDS: &[&str] = &["edit", "change"];
const CANCEL_KEYWORDS: &[&str] = &["cancel", "menu", "restart"];

/// The state machine driving every conversation.
#[derive(Clone)]
pub struct FlowEngine {
    flow: Arc<FlowDefinition>,
}

impl FlowEngine {
    pub fn new(flow: Arc<FlowDefinition>) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    /// Advance a session by one inbound message.
    ///
    /// The only mutation on a recoverable-error path (invalid menu choice,
    /// failed field validation) is `last_activity_at`.
    pub fn advance(
        &self,
        session: &mut Session,
        raw: &str,
    ) -> Result<ResponseDirective, FlowError> {
        let input = raw.trim();
        let keyword = input.to_lowercase();
        let node = self.flow.get(&session.current_node)?;

        let directive = match &node.kind {
            NodeKind::Menu { children } => {
                let choice = input
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (1..=children.len()).contains(n));
                match choice {
                    Some(n) => {
                        let child = &children[n - 1];
                        if let Some(service) = child.service {
                            // Crossing into a different service branch
                            // invalidates previously collected fields.
                            if session.service != Some(service) {
                                session.fields.clear();
                            }
                            session.service = Some(service);
                        }
                        let target = child.target.clone();
                        let next = self.enter(session, &target)?;
                        self.render(next, session)
                    }
                    None => ResponseDirective::plain(format!(
                        "Invalid selection. Please reply with one of the numbers below.\n\n{}",
                        self.render_text(node, session)
                    )),
                }
            }

            NodeKind::Input {
                field,
                validator,
                next,
            } => match validator.validate(raw) {
                Ok(value) => {
                    session.fields.set(field, value);
                    let next = next.clone();
                    let target = self.enter(session, &next)?;
                    self.render(target, session)
                }
                Err(err) => ResponseDirective::plain(format!(
                    "{}\n\n{}",
                    err.message, node.prompt.text
                )),
            },

            NodeKind::Confirm { on_confirm } => {
                if CONFIRM_KEYWORDS.contains(&keyword.as_str()) {
                    let target = on_confirm.clone();
                    let submit = self.enter(session, &target)?;
                    let NodeKind::Submit { service, .. } = &submit.kind else {
                        return Err(FlowError::NotSubmit(submit.id.clone()));
                    };
                    let request = SubmissionRequest {
                        id: Uuid::new_v4(),
                        service: *service,
                        sender_id: session.sender_id.clone(),
                        fields: session.fields.clone(),
                    };
                    ResponseDirective::plain(submit.prompt.text.clone())
                        .with_submission(request)
                } else if EDIT_KEYWORDS.contains(&keyword.as_str()) {
                    self.pop_to_last_input(session)?
                } else if CANCEL_KEYWORDS.contains(&keyword.as_str()) {
                    session.reset_to(&self.flow.root().clone(), Utc::now());
                    let root = self.flow.get(&session.current_node)?;
                    ResponseDirective::plain(format!(
                        "Application cancelled.\n\n{}",
                        self.render_text(root, session)
                    ))
                } else {
                    self.render(node, session)
                }
            }

            // A duplicate inbound while a submission is in flight. Never
            // re-emit the submission request.
            NodeKind::Submit { .. } => ResponseDirective::plain(
                "Your application is being processed. Please wait a moment.",
            ),

            NodeKind::Terminal => {
                session.reset_to(&self.flow.root().clone(), Utc::now());
                let root = self.flow.get(&session.current_node)?;
                self.render(root, session)
            }
        };

        session.touch(Utc::now());
        Ok(directive)
    }

    /// Finalize a submission outcome for a session parked on a `Submit` node.
    pub fn resolve_submission(
        &self,
        session: &mut Session,
        result: &SubmissionResult,
    ) -> Result<ResponseDirective, FlowError> {
        let node = self.flow.get(&session.current_node)?;
        let NodeKind::Submit {
            on_success,
            on_failure,
            ..
        } = &node.kind
        else {
            return Err(FlowError::NotSubmit(session.current_node.clone()));
        };
        let (on_success, on_failure) = (on_success.clone(), on_failure.clone());

        let directive = match result {
            SubmissionResult::Accepted { record_id } => {
                let done = self.goto(session, &on_success)?;
                session.status = SessionStatus::Submitted;
                let mut text = done.prompt.text.clone();
                let mut variables = BTreeMap::new();
                if let Some(reference) = record_id {
                    text.push_str(&format!("\n\nYour reference number is {reference}."));
                    variables.insert("reference".to_string(), reference.clone());
                }
                match &done.prompt.template_id {
                    Some(template_id) => {
                        ResponseDirective::template(template_id.clone(), variables, text)
                    }
                    None => ResponseDirective::plain(text),
                }
            }
            SubmissionResult::FieldValidation { messages } => {
                let confirm = self.goto(session, &on_failure)?;
                let mut text = String::from("We couldn't submit your application:\n");
                for message in messages {
                    text.push_str(&format!("- {message}\n"));
                }
                text.push_str(&format!(
                    "\nReply EDIT to correct your answers.\n\n{}",
                    self.render_text(confirm, session)
                ));
                ResponseDirective::plain(text)
            }
            SubmissionResult::Conflict { message } => {
                let confirm = self.goto(session, &on_failure)?;
                ResponseDirective::plain(format!(
                    "A matching application already exists: {message}\n\n{}",
                    self.render_text(confirm, session)
                ))
            }
            SubmissionResult::Unavailable { .. } => {
                self.goto(session, &on_failure)?;
                ResponseDirective::plain(
                    "The service is temporarily unavailable. \
                     Please try again in a few minutes by replying CONFIRM.",
                )
            }
        };

        session.touch(Utc::now());
        Ok(directive)
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Move to `target`, pushing the current node onto the history.
    fn enter<'a>(
        &'a self,
        session: &mut Session,
        target: &str,
    ) -> Result<&'a FlowNode, FlowError> {
        session.history.push(session.current_node.clone());
        self.goto(session, target)
    }

    /// Move to `target` without touching the history.
    fn goto<'a>(
        &'a self,
        session: &mut Session,
        target: &str,
    ) -> Result<&'a FlowNode, FlowError> {
        let node = self.flow.get(target)?;
        session.current_node = node.id.clone();
        match node.kind {
            NodeKind::Confirm { .. } => session.status = SessionStatus::AwaitingConfirmation,
            NodeKind::Menu { .. } | NodeKind::Input { .. } => {
                session.status = SessionStatus::Active
            }
            // Submit keeps AwaitingConfirmation until the outcome is known;
            // Terminal status is set by the resolver.
            NodeKind::Submit { .. } | NodeKind::Terminal => {}
        }
        Ok(node)
    }

    /// EDIT at a confirm node: walk the history back to the most recently
    /// visited input node of the current branch. Collected fields are
    /// retained; the user re-enters that one field.
    fn pop_to_last_input(
        &self,
        session: &mut Session,
    ) -> Result<ResponseDirective, FlowError> {
        while let Some(prev) = session.history.pop() {
            let node = self.flow.get(&prev)?;
            if node.is_input() {
                session.current_node = prev;
                session.status = SessionStatus::Active;
                return Ok(self.render(node, session));
            }
        }
        // No input in the history: fall back to re-prompting the confirm.
        let node = self.flow.get(&session.current_node)?;
        Ok(self.render(node, session))
    }

    // ── Rendering ───────────────────────────────────────────────────

    fn render(&self, node: &FlowNode, session: &Session) -> ResponseDirective {
        let text = self.render_text(node, session);
        match &node.prompt.template_id {
            Some(template_id) => {
                let variables = self.template_variables(node, session);
                ResponseDirective::template(template_id.clone(), variables, text)
            }
            None => ResponseDirective::plain(text),
        }
    }

    fn render_text(&self, node: &FlowNode, session: &Session) -> String {
        match &node.kind {
            NodeKind::Menu { children } => {
                let mut text = node.prompt.text.clone();
                text.push('\n');
                for (i, child) in children.iter().enumerate() {
                    text.push_str(&format!("\n{}. {}", i + 1, child.label));
                }
                text
            }
            NodeKind::Confirm { .. } => {
                format!(
                    "{}\n\nReply CONFIRM to submit, EDIT to change your last answer, \
                     or CANCEL to start over.",
                    self.summary_for(node, session)
                )
            }
            _ => node.prompt.text.clone(),
        }
    }

    fn template_variables(
        &self,
        node: &FlowNode,
        session: &Session,
    ) -> BTreeMap<String, String> {
        let mut variables = BTreeMap::new();
        if let NodeKind::Confirm { .. } = node.kind {
            variables.insert("summary".to_string(), self.summary_for(node, session));
        }
        variables
    }

    /// The confirm-node summary. The service is resolved from the submit
    /// node behind the confirm, falling back to the session's selection.
    fn summary_for(&self, node: &FlowNode, session: &Session) -> String {
        let service = self
            .confirm_service(node)
            .or(session.service)
            .unwrap_or(ServiceKind::UniversalApplication);
        format::service_summary(service, &session.fields)
    }

    fn confirm_service(&self, node: &FlowNode) -> Option<ServiceKind> {
        let NodeKind::Confirm { on_confirm } = &node.kind else {
            return None;
        };
        match &self.flow.node(on_confirm)?.kind {
            NodeKind::Submit { service, .. } => Some(*service),
            _ => None,
        }
    }
}
