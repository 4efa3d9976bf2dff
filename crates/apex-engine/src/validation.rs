//! Graph validation for workflow graphs
//!
//! A pure function over (nodes, edges) producing structural findings.
//! It is re-run on every change and never blocks a run itself; whether
//! errors or warnings stop execution is the caller's decision.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::node_config::NodeConfig;
use crate::types::{NodeCategory, WorkflowEdge, WorkflowGraph, WorkflowNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single validation finding
///
/// `id` is stable across runs for the same problem (`no-trigger`,
/// `orphan-<nodeId>`, `circular-dependency`, ...) so callers can diff
/// successive reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
}

impl Finding {
    fn new(id: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            message: message.into(),
            node_id: None,
            edge_id: None,
        }
    }

    fn on_node(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }

    fn on_edge(mut self, edge_id: &str) -> Self {
        self.edge_id = Some(edge_id.to_string());
        self
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "[{}] {}", severity, self.message)
    }
}

/// All findings for one graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn errors(&self) -> Vec<&Finding> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<&Finding> {
        self.with_severity(Severity::Warning)
    }

    /// No error-level findings (warnings allowed)
    pub fn is_valid(&self) -> bool {
        !self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    /// Findings attached to one node
    pub fn for_node(&self, node_id: &str) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.node_id.as_deref() == Some(node_id))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.findings.iter().any(|f| f.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    fn with_severity(&self, severity: Severity) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.severity == severity).collect()
    }
}

/// Validate a graph
pub fn validate_graph(graph: &WorkflowGraph) -> ValidationReport {
    validate(&graph.nodes, &graph.edges)
}

/// Validate nodes and edges
///
/// Returns all findings (not just the first). Every rule runs on every
/// call.
pub fn validate(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> ValidationReport {
    let mut findings = Vec::new();

    check_trigger_presence(nodes, &mut findings);
    check_node_types(nodes, &mut findings);
    check_edge_references(nodes, edges, &mut findings);
    check_connectivity(nodes, edges, &mut findings);
    check_configuration(nodes, &mut findings);
    detect_cycles(nodes, edges, &mut findings);

    ValidationReport { findings }
}

/// A non-empty graph needs at least one trigger
fn check_trigger_presence(nodes: &[WorkflowNode], findings: &mut Vec<Finding>) {
    if nodes.is_empty() {
        return;
    }
    let has_trigger = nodes
        .iter()
        .any(|n| n.category() == Some(NodeCategory::Trigger));
    if !has_trigger {
        findings.push(Finding::new(
            "no-trigger",
            Severity::Error,
            "Workflow must have at least one trigger node",
        ));
    }
}

fn check_node_types(nodes: &[WorkflowNode], findings: &mut Vec<Finding>) {
    for node in nodes.iter().filter(|n| !n.node_type.is_known()) {
        findings.push(
            Finding::new(
                format!("unknown-type-{}", node.id),
                Severity::Error,
                format!("Node \"{}\" has unknown type '{}'", node.data.label, node.node_type),
            )
            .on_node(&node.id),
        );
    }
}

/// Both endpoints of every edge must exist
fn check_edge_references(nodes: &[WorkflowNode], edges: &[WorkflowEdge], findings: &mut Vec<Finding>) {
    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                findings.push(
                    Finding::new(
                        format!("dangling-edge-{}-{}", edge.id, endpoint),
                        Severity::Error,
                        format!("Edge '{}' references unknown node '{}'", edge.id, endpoint),
                    )
                    .on_edge(&edge.id),
                );
            }
        }
    }
}

/// Orphaned triggers, unfed outputs and isolated nodes
fn check_connectivity(nodes: &[WorkflowNode], edges: &[WorkflowEdge], findings: &mut Vec<Finding>) {
    let with_incoming: HashSet<&str> = edges.iter().map(|e| e.target.as_str()).collect();
    let with_outgoing: HashSet<&str> = edges.iter().map(|e| e.source.as_str()).collect();
    let multiple = nodes.len() > 1;

    for node in nodes {
        let has_in = with_incoming.contains(node.id.as_str());
        let has_out = with_outgoing.contains(node.id.as_str());
        let label = &node.data.label;

        match node.category() {
            Some(NodeCategory::Trigger) => {
                if !has_out && multiple {
                    findings.push(
                        Finding::new(
                            format!("orphan-{}", node.id),
                            Severity::Warning,
                            format!("Trigger node \"{}\" has no outgoing connections", label),
                        )
                        .on_node(&node.id),
                    );
                }
            }
            Some(NodeCategory::Output) => {
                if !has_in {
                    findings.push(
                        Finding::new(
                            format!("no-input-{}", node.id),
                            Severity::Warning,
                            format!("Output node \"{}\" has no incoming connections", label),
                        )
                        .on_node(&node.id),
                    );
                }
            }
            _ => {
                if !has_in && !has_out && multiple {
                    findings.push(
                        Finding::new(
                            format!("isolated-{}", node.id),
                            Severity::Error,
                            format!("Node \"{}\" is not connected to the workflow", label),
                        )
                        .on_node(&node.id),
                    );
                }
            }
        }
    }
}

/// Category-specific configuration checks
fn check_configuration(nodes: &[WorkflowNode], findings: &mut Vec<Finding>) {
    for node in nodes {
        let label = &node.data.label;
        match &node.data.config {
            NodeConfig::Invalid { error, .. } => findings.push(
                Finding::new(
                    format!("invalid-config-{}", node.id),
                    Severity::Error,
                    format!("Node \"{}\" has invalid configuration: {}", label, error),
                )
                .on_node(&node.id),
            ),
            NodeConfig::Hitl(config) if !config.has_reviewer() => findings.push(
                Finding::new(
                    format!("config-{}", node.id),
                    Severity::Warning,
                    format!("HITL node \"{}\" should have a reviewer assigned", label),
                )
                .on_node(&node.id),
            ),
            NodeConfig::Decision(config) if !config.has_condition() => findings.push(
                Finding::new(
                    format!("config-{}", node.id),
                    Severity::Warning,
                    format!("Decision node \"{}\" has no condition and will always take the true path", label),
                )
                .on_node(&node.id),
            ),
            _ => {}
        }
    }
}

/// Depth-first search from every trigger; reports one finding if any
/// node reappears on the current path
fn detect_cycles(nodes: &[WorkflowNode], edges: &[WorkflowEdge], findings: &mut Vec<Finding>) {
    enum Step<'a> {
        Enter(&'a str),
        Exit(&'a str),
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_path: HashSet<&str> = HashSet::new();

    let triggers = nodes
        .iter()
        .filter(|n| n.category() == Some(NodeCategory::Trigger));

    for trigger in triggers {
        let mut stack = vec![Step::Enter(trigger.id.as_str())];

        while let Some(step) = stack.pop() {
            match step {
                Step::Exit(id) => {
                    on_path.remove(id);
                }
                Step::Enter(id) => {
                    if on_path.contains(id) {
                        findings.push(Finding::new(
                            "circular-dependency",
                            Severity::Error,
                            "Workflow contains a circular dependency",
                        ));
                        return;
                    }
                    if !visited.insert(id) {
                        continue;
                    }
                    on_path.insert(id);
                    stack.push(Step::Exit(id));
                    for edge in edges.iter().filter(|e| e.source == id) {
                        stack.push(Step::Enter(edge.target.as_str()));
                    }
                }
            }
        }
    }
}
