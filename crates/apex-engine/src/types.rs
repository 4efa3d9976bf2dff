//! Core types for workflow graphs
//!
//! These types define the structure of claims workflows: typed nodes,
//! branch-labelled edges, the owning definition and the execution
//! state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node_config::NodeConfig;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Node type tag
///
/// Serialized as the camelCase tag used in graph files (`claimIntake`,
/// `hitlCheckpoint`, ...). Tags outside the catalog are kept as
/// [`NodeType::Unknown`] so they can be reported by validation instead
/// of failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    ClaimIntake,
    PriorAuthRequest,
    ScheduledBatch,
    Webhook,
    DocumentAnalyzer,
    EligibilityCheck,
    MedicalCoding,
    PolicyEngine,
    GeminiAnalyzer,
    FraudDetector,
    ClinicalReasoner,
    DecisionBranch,
    ParallelSplit,
    LoopIterator,
    HitlCheckpoint,
    QualityReview,
    ExceptionHandler,
    DecisionOutput,
    Notification,
    ApiResponse,
    AuditLog,
    Unknown(String),
}

impl NodeType {
    /// Every catalogued node type, in palette order
    pub const ALL: [NodeType; 21] = [
        NodeType::ClaimIntake,
        NodeType::PriorAuthRequest,
        NodeType::ScheduledBatch,
        NodeType::Webhook,
        NodeType::DocumentAnalyzer,
        NodeType::EligibilityCheck,
        NodeType::MedicalCoding,
        NodeType::PolicyEngine,
        NodeType::GeminiAnalyzer,
        NodeType::FraudDetector,
        NodeType::ClinicalReasoner,
        NodeType::DecisionBranch,
        NodeType::ParallelSplit,
        NodeType::LoopIterator,
        NodeType::HitlCheckpoint,
        NodeType::QualityReview,
        NodeType::ExceptionHandler,
        NodeType::DecisionOutput,
        NodeType::Notification,
        NodeType::ApiResponse,
        NodeType::AuditLog,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::ClaimIntake => "claimIntake",
            Self::PriorAuthRequest => "priorAuthRequest",
            Self::ScheduledBatch => "scheduledBatch",
            Self::Webhook => "webhook",
            Self::DocumentAnalyzer => "documentAnalyzer",
            Self::EligibilityCheck => "eligibilityCheck",
            Self::MedicalCoding => "medicalCoding",
            Self::PolicyEngine => "policyEngine",
            Self::GeminiAnalyzer => "geminiAnalyzer",
            Self::FraudDetector => "fraudDetector",
            Self::ClinicalReasoner => "clinicalReasoner",
            Self::DecisionBranch => "decisionBranch",
            Self::ParallelSplit => "parallelSplit",
            Self::LoopIterator => "loopIterator",
            Self::HitlCheckpoint => "hitlCheckpoint",
            Self::QualityReview => "qualityReview",
            Self::ExceptionHandler => "exceptionHandler",
            Self::DecisionOutput => "decisionOutput",
            Self::Notification => "notification",
            Self::ApiResponse => "apiResponse",
            Self::AuditLog => "auditLog",
            Self::Unknown(tag) => tag,
        }
    }

    /// Category of a catalogued type; `None` for unknown tags
    pub fn category(&self) -> Option<NodeCategory> {
        let category = match self {
            Self::ClaimIntake | Self::PriorAuthRequest | Self::ScheduledBatch | Self::Webhook => {
                NodeCategory::Trigger
            }
            Self::DocumentAnalyzer
            | Self::EligibilityCheck
            | Self::MedicalCoding
            | Self::PolicyEngine => NodeCategory::Processing,
            Self::GeminiAnalyzer | Self::FraudDetector | Self::ClinicalReasoner => NodeCategory::Ai,
            Self::DecisionBranch | Self::ParallelSplit | Self::LoopIterator => NodeCategory::Control,
            Self::HitlCheckpoint | Self::QualityReview | Self::ExceptionHandler => NodeCategory::Hitl,
            Self::DecisionOutput | Self::Notification | Self::ApiResponse | Self::AuditLog => {
                NodeCategory::Output
            }
            Self::Unknown(_) => return None,
        };
        Some(category)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for NodeType {
    fn from(tag: String) -> Self {
        NodeType::ALL
            .iter()
            .find(|t| t.as_str() == tag)
            .cloned()
            .unwrap_or(NodeType::Unknown(tag))
    }
}

impl From<&str> for NodeType {
    fn from(tag: &str) -> Self {
        NodeType::from(tag.to_string())
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Unknown(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points (claim intake, webhooks, schedules)
    Trigger,
    /// Deterministic claim processing
    Processing,
    /// Model-backed analysis
    Ai,
    /// Branching and iteration
    Control,
    /// Human review checkpoints
    Hitl,
    /// Terminal nodes producing the final payload of a branch
    Output,
}

/// Per-node execution status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    /// Suspended at a human review checkpoint
    Paused,
}

/// Canvas position (carried, not interpreted)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    /// Display label
    pub label: String,
    /// Typed configuration, parsed according to the node type
    pub config: NodeConfig,
    pub status: NodeStatus,
    /// Decision certainty in [0, 1], set by the last run
    pub confidence_score: Option<f64>,
    /// Error message from the last run
    pub error: Option<String>,
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNode", into = "RawNode")]
pub struct WorkflowNode {
    pub id: NodeId,
    pub node_type: NodeType,
    pub position: Position,
    pub data: NodeData,
}

impl WorkflowNode {
    /// Create an idle node with the type's default configuration
    pub fn new(id: impl Into<String>, node_type: NodeType, label: impl Into<String>) -> Self {
        let config = NodeConfig::default_for(&node_type);
        Self {
            id: id.into(),
            node_type,
            position: Position::default(),
            data: NodeData {
                label: label.into(),
                config,
                status: NodeStatus::Idle,
                confidence_score: None,
                error: None,
            },
        }
    }

    pub fn category(&self) -> Option<NodeCategory> {
        self.node_type.category()
    }

    pub fn label(&self) -> &str {
        &self.data.label
    }

    /// Clear run state (status, confidence, error)
    pub fn reset(&mut self) {
        self.data.status = NodeStatus::Idle;
        self.data.confidence_score = None;
        self.data.error = None;
    }
}

/// Wire form of a node: `{ id, type, position, data: { label, nodeType, config, ... } }`
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    data: RawNodeData,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodeData {
    #[serde(default)]
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node_type: Option<NodeType>,
    #[serde(default)]
    config: serde_json::Value,
    #[serde(default)]
    status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<RawNode> for WorkflowNode {
    fn from(raw: RawNode) -> Self {
        // The outer `type` is authoritative; `data.nodeType` is a mirror
        let config = NodeConfig::parse(&raw.node_type, raw.data.config);
        Self {
            id: raw.id,
            node_type: raw.node_type,
            position: raw.position,
            data: NodeData {
                label: raw.data.label,
                config,
                status: raw.data.status,
                confidence_score: raw.data.confidence_score,
                error: raw.data.error,
            },
        }
    }
}

impl From<WorkflowNode> for RawNode {
    fn from(node: WorkflowNode) -> Self {
        Self {
            id: node.id,
            node_type: node.node_type.clone(),
            position: node.position,
            data: RawNodeData {
                label: node.data.label,
                node_type: Some(node.node_type),
                config: node.data.config.to_value(),
                status: node.data.status,
                confidence_score: node.data.confidence_score,
                error: node.data.error,
            },
        }
    }
}

/// A directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Branch label selecting this edge for a matching `nextPath`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Presentation hint toggled while a run is active
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub animated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl WorkflowEdge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            animated: false,
            label: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Nodes and edges of a workflow
///
/// This is the sole serialization the engine consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find_edge(&self, id: &str) -> Option<&WorkflowEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a WorkflowEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a WorkflowEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    pub fn has_incoming(&self, node_id: &str) -> bool {
        self.incoming_edges(node_id).next().is_some()
    }

    pub fn has_outgoing(&self, node_id: &str) -> bool {
        self.outgoing_edges(node_id).next().is_some()
    }

    /// Nodes with no incoming edge, in listed order
    pub fn trigger_nodes(&self) -> Vec<&WorkflowNode> {
        self.nodes
            .iter()
            .filter(|n| !self.has_incoming(&n.id))
            .collect()
    }

    /// Targets eligible after `node_id` produced `next_path`
    ///
    /// An edge is followed when it carries no handle, when no path was
    /// selected, or when its handle equals the selected path. Targets
    /// missing from the graph are skipped.
    pub fn next_targets(&self, node_id: &str, next_path: Option<&str>) -> Vec<NodeId> {
        self.outgoing_edges(node_id)
            .filter(|edge| match (next_path, edge.source_handle.as_deref()) {
                (Some(path), Some(handle)) => path == handle,
                _ => true,
            })
            .filter(|edge| {
                let exists = self.find_node(&edge.target).is_some();
                if !exists {
                    log::warn!("Edge '{}' targets missing node '{}'", edge.id, edge.target);
                }
                exists
            })
            .map(|edge| edge.target.clone())
            .collect()
    }

    /// Targets reached through edges explicitly labelled `handle`
    pub fn handle_targets(&self, node_id: &str, handle: &str) -> Vec<NodeId> {
        self.outgoing_edges(node_id)
            .filter(|edge| edge.source_handle.as_deref() == Some(handle))
            .filter(|edge| self.find_node(&edge.target).is_some())
            .map(|edge| edge.target.clone())
            .collect()
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, node_id: &str) -> Option<WorkflowNode> {
        let pos = self.nodes.iter().position(|n| n.id == node_id)?;
        self.edges.retain(|e| !e.touches(node_id));
        Some(self.nodes.remove(pos))
    }

    pub fn set_edges_animated(&mut self, animated: bool) {
        for edge in &mut self.edges {
            edge.animated = animated;
        }
    }

    /// Reset every node to idle
    pub fn reset_statuses(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
    }
}

/// Lifecycle of a workflow definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// A named, versioned workflow owning its graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Incremented on every save
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(flatten)]
    pub graph: WorkflowGraph,
}

fn default_version() -> u32 {
    1
}

impl WorkflowDefinition {
    /// Create an empty draft at version 1
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("workflow-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: description.into(),
            version: 1,
            created_at: now,
            updated_at: now,
            created_by: None,
            status: WorkflowStatus::Draft,
            graph: WorkflowGraph::default(),
        }
    }

    pub fn with_graph(mut self, graph: WorkflowGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn is_archived(&self) -> bool {
        self.status == WorkflowStatus::Archived
    }
}

/// Run-level state machine
///
/// `idle -> running -> {paused, waiting_hitl, completed, error}`, with
/// `running <-> paused` the only bidirectional pair. `stopped` is
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    WaitingHitl,
    Completed,
    Error,
    Stopped,
}

impl ExecutionStatus {
    /// Whether a run is currently traversing nodes (or parked mid-traversal)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }

    /// Check a transition within a single run
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Paused | WaitingHitl | Completed | Error | Stopped) => true,
            (Paused, Running | Stopped) => true,
            // Resolving a checkpoint resumes the suspended branch
            (WaitingHitl, Running | Stopped) => true,
            (Idle, Stopped) => true,
            _ => false,
        }
    }
}
