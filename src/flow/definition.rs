//! The flow definition — a static tree of nodes validated at startup.
//!
//! Structural invariants (no missing targets, reachability, every node has a
//! path to an exit) are checked when the definition is built, so the engine
//! never discovers a broken edge at runtime.

use std::collections::{HashMap, HashSet};

use crate::error::FlowError;
use crate::fields::FieldValidator;
use crate::flow::node::{FlowNode, MenuChild, NodeId, NodeKind, Prompt, ServiceKind};

/// The immutable decision tree shared by all sessions.
#[derive(Debug)]
pub struct FlowDefinition {
    root: NodeId,
    nodes: HashMap<NodeId, FlowNode>,
}

impl FlowDefinition {
    /// Build and validate a definition from a node list.
    pub fn new(root: impl Into<NodeId>, nodes: Vec<FlowNode>) -> Result<Self, FlowError> {
        let root = root.into();
        let mut map = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id.clone();
            if map.insert(id.clone(), node).is_some() {
                return Err(FlowError::DuplicateNode(id));
            }
        }
        let def = Self { root, nodes: map };
        def.validate()?;
        Ok(def)
    }

    pub fn root(&self) -> &NodeId {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    /// Node lookup that treats a missing id as a flow error.
    pub fn get(&self, id: &str) -> Result<&FlowNode, FlowError> {
        self.nodes
            .get(id)
            .ok_or_else(|| FlowError::UnknownNode(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn validate(&self) -> Result<(), FlowError> {
        let root = self
            .nodes
            .get(&self.root)
            .ok_or_else(|| FlowError::UnknownNode(self.root.clone()))?;
        if !matches!(root.kind, NodeKind::Menu { .. }) {
            return Err(FlowError::RootNotMenu(self.root.clone()));
        }

        // Every referenced target must exist.
        for node in self.nodes.values() {
            for target in node.successors() {
                if !self.nodes.contains_key(target) {
                    return Err(FlowError::MissingTarget {
                        node: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        // Every node must be reachable from the root.
        let mut reachable = HashSet::new();
        let mut stack = vec![&self.root];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            for target in self.nodes[id].successors() {
                stack.push(target);
            }
        }
        for id in self.nodes.keys() {
            if !reachable.contains(id) {
                return Err(FlowError::Unreachable(id.clone()));
            }
        }

        // Every node must have a path to a submit or terminal node.
        for id in self.nodes.keys() {
            if !self.reaches_exit(id, &mut HashSet::new()) {
                return Err(FlowError::NoExit(id.clone()));
            }
        }

        Ok(())
    }

    fn reaches_exit(&self, id: &NodeId, visited: &mut HashSet<NodeId>) -> bool {
        if !visited.insert(id.clone()) {
            return false;
        }
        let node = &self.nodes[id];
        match node.kind {
            NodeKind::Submit { .. } | NodeKind::Terminal => true,
            _ => node
                .successors()
                .iter()
                .any(|next| self.reaches_exit(next, visited)),
        }
    }
}

/// One `Input` step of a service branch.
struct InputSpec {
    field: &'static str,
    validator: FieldValidator,
    prompt: &'static str,
}

const fn step(
    field: &'static str,
    validator: FieldValidator,
    prompt: &'static str,
) -> InputSpec {
    InputSpec {
        field,
        validator,
        prompt,
    }
}

/// Append a full service branch (inputs → confirm → submit → done) and
/// return the id of its first input node.
fn service_branch(
    nodes: &mut Vec<FlowNode>,
    prefix: &str,
    service: ServiceKind,
    inputs: &[InputSpec],
) -> NodeId {
    let confirm_id = format!("{prefix}.confirm");
    let submit_id = format!("{prefix}.submit");
    let done_id = format!("{prefix}.done");

    let entry = format!("{prefix}.{}", inputs[0].field);
    for (i, spec) in inputs.iter().enumerate() {
        let id = format!("{prefix}.{}", spec.field);
        let next = match inputs.get(i + 1) {
            Some(next_spec) => format!("{prefix}.{}", next_spec.field),
            None => confirm_id.clone(),
        };
        nodes.push(FlowNode::input(
            id,
            Prompt::text(spec.prompt),
            spec.field,
            spec.validator,
            next,
        ));
    }

    nodes.push(FlowNode::confirm(
        confirm_id.clone(),
        Prompt::with_template("confirm_summary", "Please review your application."),
        submit_id.clone(),
    ));
    nodes.push(FlowNode::submit(
        submit_id,
        Prompt::text("Submitting your application..."),
        service,
        done_id.clone(),
        confirm_id,
    ));
    nodes.push(FlowNode::terminal(
        done_id,
        Prompt::with_template(
            "application_received",
            "Thank you! Your application has been received. \
             Our team will be in touch. Reply with anything to return to the main menu.",
        ),
    ));

    entry
}

/// The default flow: root menu over the seven registration services.
///
/// Every branch has the same shape: inputs → confirm → submit → done.
pub fn default_flow() -> Result<FlowDefinition, FlowError> {
    use FieldValidator as V;

    let mut nodes = Vec::new();

    let company = service_branch(
        &mut nodes,
        "company",
        ServiceKind::CompanyRegistration,
        &[
            step("full_name", V::Text, "What is your full name?"),
            step(
                "national_id",
                V::NationalId,
                "What is your national ID number? (e.g. 63-123456-A-42)",
            ),
            step("phone", V::Phone, "What phone number should we use to contact you?"),
            step("email", V::Email, "What is your email address?"),
            step("company_name", V::Text, "What name would you like to register the company under?"),
            step(
                "business_description",
                V::Text,
                "Briefly describe what the company will do.",
            ),
            step(
                "share_capital",
                V::ShareCapital,
                "What is the company's share capital in USD? (minimum 1)",
            ),
            step(
                "address",
                V::Address,
                "What is the company's physical address? You can send it on multiple lines.",
            ),
        ],
    );

    let dereg = service_branch(
        &mut nodes,
        "dereg",
        ServiceKind::CompanyDeregistration,
        &[
            step("full_name", V::Text, "What is your full name?"),
            step(
                "national_id",
                V::NationalId,
                "What is your national ID number? (e.g. 63-123456-A-42)",
            ),
            step("phone", V::Phone, "What phone number should we use to contact you?"),
            step("company_name", V::Text, "What is the registered name of the company?"),
            step(
                "registration_number",
                V::Text,
                "What is the company's registration number?",
            ),
            step("reason", V::Text, "Why is the company being de-registered?"),
        ],
    );

    let vendor = service_branch(
        &mut nodes,
        "vendor",
        ServiceKind::VendorNumber,
        &[
            step("full_name", V::Text, "What is your full name?"),
            step(
                "national_id",
                V::NationalId,
                "What is your national ID number? (e.g. 63-123456-A-42)",
            ),
            step("phone", V::Phone, "What phone number should we use to contact you?"),
            step("company_name", V::Text, "What is your company or trading name?"),
            step("business_type", V::Text, "What type of business do you run?"),
            step(
                "address",
                V::Address,
                "What is your business address? You can send it on multiple lines.",
            ),
        ],
    );

    let church = service_branch(
        &mut nodes,
        "church",
        ServiceKind::ChurchRegistration,
        &[
            step("church_name", V::Text, "What is the name of the church?"),
            step("founder_name", V::Text, "What is the founder's full name?"),
            step(
                "national_id",
                V::NationalId,
                "What is the founder's national ID number? (e.g. 63-123456-A-42)",
            ),
            step("phone", V::Phone, "What phone number should we use to contact you?"),
            step("email", V::Email, "What is the church's email address?"),
            step(
                "address",
                V::Address,
                "What is the church's physical address? You can send it on multiple lines.",
            ),
        ],
    );

    let praz = service_branch(
        &mut nodes,
        "praz",
        ServiceKind::PrazBankRegistration,
        &[
            step("company_name", V::Text, "What is the registered company name?"),
            step("praz_number", V::Text, "What is your PRAZ registration number?"),
            step("bank_name", V::Text, "Which bank is the account with?"),
            step("branch", V::Text, "Which branch?"),
            step("account_name", V::Text, "What is the account name?"),
            step("account_number", V::Text, "What is the account number?"),
            step("phone", V::Phone, "What phone number should we use to contact you?"),
        ],
    );

    let college = service_branch(
        &mut nodes,
        "college",
        ServiceKind::CollegeRegistration,
        &[
            step("college_name", V::Text, "What is the name of the college?"),
            step("contact_person", V::Text, "Who is the contact person?"),
            step(
                "national_id",
                V::NationalId,
                "What is the contact person's national ID number? (e.g. 63-123456-A-42)",
            ),
            step("phone", V::Phone, "What phone number should we use to contact you?"),
            step("email", V::Email, "What is the college's email address?"),
            step(
                "address",
                V::Address,
                "What is the college's physical address? You can send it on multiple lines.",
            ),
            step(
                "programs_offered",
                V::Text,
                "What programs will the college offer?",
            ),
        ],
    );

    let other = service_branch(
        &mut nodes,
        "other",
        ServiceKind::UniversalApplication,
        &[
            step("full_name", V::Text, "What is your full name?"),
            step("phone", V::Phone, "What phone number should we use to contact you?"),
            step("email", V::Email, "What is your email address?"),
            step("service_name", V::Text, "Which service are you applying for?"),
            step("details", V::Text, "Please describe your application in a few sentences."),
        ],
    );

    let child = |service: ServiceKind, target: NodeId| MenuChild {
        label: service.label().to_string(),
        target,
        service: Some(service),
    };

    nodes.push(FlowNode::menu(
        "root",
        Prompt::with_template(
            "main_menu",
            "Welcome to RegDesk! I can help you apply for business registration services.\n\
             Reply with the number of the service you need:",
        ),
        vec![
            child(ServiceKind::CompanyRegistration, company),
            child(ServiceKind::CompanyDeregistration, dereg),
            child(ServiceKind::VendorNumber, vendor),
            child(ServiceKind::ChurchRegistration, church),
            child(ServiceKind::PrazBankRegistration, praz),
            child(ServiceKind::CollegeRegistration, college),
            child(ServiceKind::UniversalApplication, other),
        ],
    ));

    FlowDefinition::new("root", nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flow_validates() {
        let flow = default_flow().unwrap();
        assert_eq!(flow.root(), "root");
        assert!(flow.len() > 50);
    }

    #[test]
    fn root_lists_all_seven_services() {
        let flow = default_flow().unwrap();
        let root = flow.get("root").unwrap();
        let NodeKind::Menu { children } = &root.kind else {
            panic!("root is not a menu");
        };
        assert_eq!(children.len(), 7);
        for (kind, chosen) in ServiceKind::ALL.iter().zip(children) {
            assert_eq!(chosen.service, Some(*kind));
        }
    }

    #[test]
    fn every_branch_ends_in_confirm_submit_done() {
        let flow = default_flow().unwrap();
        for prefix in ["company", "dereg", "vendor", "church", "praz", "college", "other"] {
            let confirm = flow.get(&format!("{prefix}.confirm")).unwrap();
            assert!(matches!(confirm.kind, NodeKind::Confirm { .. }));
            let submit = flow.get(&format!("{prefix}.submit")).unwrap();
            let NodeKind::Submit { on_failure, .. } = &submit.kind else {
                panic!("{prefix}.submit is not a submit node");
            };
            assert_eq!(on_failure, &format!("{prefix}.confirm"));
            let done = flow.get(&format!("{prefix}.done")).unwrap();
            assert!(matches!(done.kind, NodeKind::Terminal));
        }
    }

    #[test]
    fn missing_target_is_rejected() {
        let nodes = vec![
            FlowNode::menu(
                "root",
                Prompt::text("menu"),
                vec![MenuChild {
                    label: "Broken".into(),
                    target: "nowhere".into(),
                    service: None,
                }],
            ),
        ];
        let err = FlowDefinition::new("root", nodes).unwrap_err();
        assert!(matches!(err, FlowError::MissingTarget { .. }));
    }

    #[test]
    fn non_menu_root_is_rejected() {
        let nodes = vec![FlowNode::terminal("root", Prompt::text("bye"))];
        let err = FlowDefinition::new("root", nodes).unwrap_err();
        assert!(matches!(err, FlowError::RootNotMenu(_)));
    }

    #[test]
    fn unreachable_node_is_rejected() {
        let nodes = vec![
            FlowNode::menu("root", Prompt::text("menu"), vec![]),
            FlowNode::terminal("island", Prompt::text("bye")),
        ];
        let err = FlowDefinition::new("root", nodes).unwrap_err();
        assert!(matches!(err, FlowError::Unreachable(_)));
    }

    #[test]
    fn unknown_root_is_rejected() {
        let err = FlowDefinition::new("root", vec![]).unwrap_err();
        assert!(matches!(err, FlowError::UnknownNode(_)));
    }
}
