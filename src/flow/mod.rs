//! The conversation flow — definition, directives, and engine.

pub mod definition;
pub mod directive;
pub mod engine;
pub mod node;

pub use definition::{FlowDefinition, default_flow};
pub use directive::{DirectiveKind, ResponseDirective, SubmissionRequest, SubmissionResult};
pub use engine::FlowEngine;
pub use node::{FlowNode, MenuChild, NodeId, NodeKind, Prompt, ServiceKind};
