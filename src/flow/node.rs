//! Flow node types — the immutable building blocks of the decision tree.

use serde::{Deserialize, Serialize};

use crate::fields::FieldValidator;

/// Identifier of a node in the flow definition.
pub type NodeId = String;

/// The registration services a conversation can apply for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    CompanyRegistration,
    CompanyDeregistration,
    VendorNumber,
    ChurchRegistration,
    PrazBankRegistration,
    CollegeRegistration,
    UniversalApplication,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 7] = [
        Self::CompanyRegistration,
        Self::CompanyDeregistration,
        Self::VendorNumber,
        Self::ChurchRegistration,
        Self::PrazBankRegistration,
        Self::CollegeRegistration,
        Self::UniversalApplication,
    ];

    /// Human-readable service name for menus and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CompanyRegistration => "Company Registration",
            Self::CompanyDeregistration => "Company De-registration",
            Self::VendorNumber => "Vendor Number",
            Self::ChurchRegistration => "Church Registration",
            Self::PrazBankRegistration => "PRAZ Bank Registration",
            Self::CollegeRegistration => "College Registration",
            Self::UniversalApplication => "Other Application",
        }
    }

    /// Path segment of the downstream create endpoint.
    pub fn api_path(&self) -> &'static str {
        match self {
            Self::CompanyRegistration => "company-registrations",
            Self::CompanyDeregistration => "company-deregistrations",
            Self::VendorNumber => "vendor-numbers",
            Self::ChurchRegistration => "church-registrations",
            Self::PrazBankRegistration => "praz-bank-registrations",
            Self::CollegeRegistration => "college-registrations",
            Self::UniversalApplication => "applications",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The outbound prompt attached to a node.
///
/// `text` is always present and doubles as the plain-text fallback when a
/// rich template is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub template_id: Option<String>,
    pub text: String,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            template_id: None,
            text: text.into(),
        }
    }

    pub fn with_template(template_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            template_id: Some(template_id.into()),
            text: text.into(),
        }
    }
}

/// One numbered option of a `Menu` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuChild {
    pub label: String,
    pub target: NodeId,
    /// Set when choosing this option enters a service branch. Crossing into
    /// a different service clears previously collected fields.
    pub service: Option<ServiceKind>,
}

/// Behavior of a node, dispatched on by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NodeKind {
    /// Presents ordered numbered children; advances on a valid numeric choice.
    Menu { children: Vec<MenuChild> },
    /// Requests one field, validated by `validator`; advances on success.
    Input {
        field: String,
        validator: FieldValidator,
        next: NodeId,
    },
    /// Presents the collected-field summary; advances on CONFIRM.
    Confirm { on_confirm: NodeId },
    /// Terminal action: the caller performs the submission, then the engine
    /// moves to `on_success` or back to `on_failure`.
    Submit {
        service: ServiceKind,
        on_success: NodeId,
        on_failure: NodeId,
    },
    /// Ends the interaction; any input returns to the root menu.
    Terminal,
}

/// A node of the flow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: NodeId,
    pub prompt: Prompt,
    pub kind: NodeKind,
}

impl FlowNode {
    pub fn menu(id: impl Into<NodeId>, prompt: Prompt, children: Vec<MenuChild>) -> Self {
        Self {
            id: id.into(),
            prompt,
            kind: NodeKind::Menu { children },
        }
    }

    pub fn input(
        id: impl Into<NodeId>,
        prompt: Prompt,
        field: impl Into<String>,
        validator: FieldValidator,
        next: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt,
            kind: NodeKind::Input {
                field: field.into(),
                validator,
                next: next.into(),
            },
        }
    }

    pub fn confirm(id: impl Into<NodeId>, prompt: Prompt, on_confirm: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            prompt,
            kind: NodeKind::Confirm {
                on_confirm: on_confirm.into(),
            },
        }
    }

    pub fn submit(
        id: impl Into<NodeId>,
        prompt: Prompt,
        service: ServiceKind,
        on_success: impl Into<NodeId>,
        on_failure: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt,
            kind: NodeKind::Submit {
                service,
                on_success: on_success.into(),
                on_failure: on_failure.into(),
            },
        }
    }

    pub fn terminal(id: impl Into<NodeId>, prompt: Prompt) -> Self {
        Self {
            id: id.into(),
            prompt,
            kind: NodeKind::Terminal,
        }
    }

    /// Ids of every node this node can transition to.
    pub fn successors(&self) -> Vec<&NodeId> {
        match &self.kind {
            NodeKind::Menu { children } => children.iter().map(|c| &c.target).collect(),
            NodeKind::Input { next, .. } => vec![next],
            NodeKind::Confirm { on_confirm } => vec![on_confirm],
            NodeKind::Submit {
                on_success,
                on_failure,
                ..
            } => vec![on_success, on_failure],
            NodeKind::Terminal => vec![],
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, NodeKind::Input { .. })
    }
}
