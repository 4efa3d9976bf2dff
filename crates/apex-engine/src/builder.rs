//! Fluent builder for workflow graphs
//!
//! Provides a compact API for constructing graphs programmatically,
//! mostly for tests and generated workflows.

use crate::descriptor;
use crate::node_config::NodeConfig;
use crate::types::{NodeType, Position, WorkflowEdge, WorkflowGraph, WorkflowNode};

/// Fluent builder for constructing workflow graphs
///
/// # Example
///
/// ```ignore
/// let graph = WorkflowBuilder::new()
///     .add_node("intake", NodeType::ClaimIntake)
///     .add_node("branch", NodeType::DecisionBranch)
///     .with_config(serde_json::json!({"conditionField": "amount", "operator": "greaterThan", "compareValue": "1000"}))
///     .add_node("review", NodeType::HitlCheckpoint)
///     .connect("intake", "branch")
///     .connect_handle("branch", "true", "review")
///     .build();
/// ```
#[derive(Default)]
pub struct WorkflowBuilder {
    nodes: Vec<WorkflowNode>,
    edges: Vec<WorkflowEdge>,
    edge_counter: usize,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node labelled from the catalog
    pub fn add_node(mut self, id: impl Into<String>, node_type: NodeType) -> Self {
        let label = descriptor::lookup(&node_type)
            .map(|m| m.label.to_string())
            .unwrap_or_else(|| node_type.to_string());
        let mut node = WorkflowNode::new(id, node_type, label);
        node.position = Position::new(self.nodes.len() as f64 * 200.0, 0.0);
        self.nodes.push(node);
        self
    }

    /// Set the config of the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data.config = NodeConfig::parse(&node.node_type, config);
        }
        self
    }

    /// Set the label of the most recently added node
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data.label = label.into();
        }
        self
    }

    /// Add an unconditional edge (auto-generates edge ID)
    pub fn connect(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edge_counter += 1;
        self.edges.push(WorkflowEdge::new(
            format!("edge-{}", self.edge_counter),
            source,
            target,
        ));
        self
    }

    /// Add an edge taken when the source selects `handle`
    pub fn connect_handle(
        mut self,
        source: impl Into<String>,
        handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.edge_counter += 1;
        self.edges.push(
            WorkflowEdge::new(format!("edge-{}", self.edge_counter), source, target).with_handle(handle),
        );
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> WorkflowGraph {
        WorkflowGraph::new(self.nodes, self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_labels_and_edges() {
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("custom", NodeType::AuditLog)
            .with_label("Final audit")
            .connect_handle("intake", "true", "custom")
            .build();

        assert_eq!(graph.find_node("intake").unwrap().label(), "Claim Intake");
        assert_eq!(graph.find_node("custom").unwrap().label(), "Final audit");
        assert_eq!(graph.edges[0].id, "edge-1");
        assert_eq!(graph.edges[0].source_handle.as_deref(), Some("true"));
    }
}
