//! Workflow state store
//!
//! Host-side state for one workflow: its definition, the graph being
//! edited, selection, and a mirror of the current run (statuses, audit
//! trail, open checkpoints). The engine never reads from the store; it
//! reports through [`WorkflowEvent`]s, which [`StoreEventSink`] applies.
//!
//! Structural edits are recorded in an [`UndoStack`]. Run-state changes
//! (statuses, edge animation) are not.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::audit::ExecutionLogEntry;
use crate::checkpoint::HitlCheckpoint;
use crate::descriptor;
use crate::error::{EngineError, Result};
use crate::events::{EventError, EventSink, NodeStatusData, WorkflowEvent};
use crate::types::{
    EdgeId, ExecutionStatus, NodeData, NodeId, NodeStatus, NodeType, Position, WorkflowDefinition, WorkflowEdge,
    WorkflowGraph, WorkflowNode, WorkflowStatus,
};
use crate::undo::UndoStack;
use crate::validation::validate_graph;

/// Offset applied to duplicated nodes so they don't overlap the original
const DUPLICATE_OFFSET: f64 = 50.0;

pub struct WorkflowStore {
    workflow: Option<WorkflowDefinition>,
    graph: WorkflowGraph,
    selected_node_id: Option<NodeId>,
    selected_edge_id: Option<EdgeId>,
    execution_id: Option<String>,
    execution_status: ExecutionStatus,
    current_node_id: Option<NodeId>,
    execution_logs: Vec<ExecutionLogEntry>,
    pending_checkpoints: Vec<HitlCheckpoint>,
    history: UndoStack,
    history_limit: usize,
}

impl WorkflowStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            workflow: None,
            graph: WorkflowGraph::default(),
            selected_node_id: None,
            selected_edge_id: None,
            execution_id: None,
            execution_status: ExecutionStatus::Idle,
            current_node_id: None,
            execution_logs: Vec::new(),
            pending_checkpoints: Vec::new(),
            history: UndoStack::new(history_limit),
            history_limit,
        }
    }

    // --- Workflow lifecycle ---

    /// Start a new empty draft
    pub fn create_workflow(&mut self, name: &str, description: &str) -> Result<&WorkflowDefinition> {
        self.create_workflow_as(name, description, None)
    }

    /// Start a new empty draft recording its author
    pub fn create_workflow_as(
        &mut self,
        name: &str,
        description: &str,
        created_by: Option<&str>,
    ) -> Result<&WorkflowDefinition> {
        let mut workflow = WorkflowDefinition::new(name, description);
        workflow.created_by = created_by.map(str::to_string);
        log::info!("Created workflow '{}' ({})", workflow.name, workflow.id);
        self.replace_workflow(workflow)
    }

    /// Make `workflow` current; its graph becomes the editing baseline
    pub fn load_workflow(&mut self, workflow: WorkflowDefinition) -> Result<&WorkflowDefinition> {
        log::info!(
            "Loaded workflow '{}' v{} ({} nodes)",
            workflow.name,
            workflow.version,
            workflow.graph.nodes.len()
        );
        self.replace_workflow(workflow)
    }

    fn replace_workflow(&mut self, workflow: WorkflowDefinition) -> Result<&WorkflowDefinition> {
        self.graph = workflow.graph.clone();
        self.selected_node_id = None;
        self.selected_edge_id = None;
        self.history.clear();
        self.history.record(&self.graph)?;
        Ok(self.workflow.insert(workflow))
    }

    /// Write the edited graph into the definition
    ///
    /// Bumps `version` and `updatedAt`. Archived workflows are read-only.
    pub fn save_workflow(&mut self) -> Result<WorkflowDefinition> {
        let graph = self.graph.clone();
        let workflow = self.workflow_mut()?;
        workflow.graph = graph;
        workflow.version += 1;
        workflow.updated_at = Utc::now();
        log::debug!("Saved workflow '{}' as v{}", workflow.id, workflow.version);
        Ok(workflow.clone())
    }

    /// Save and mark published; the graph must be non-empty and free of errors
    pub fn publish_workflow(&mut self) -> Result<WorkflowDefinition> {
        self.workflow_mut()?;
        if self.graph.is_empty() {
            return Err(EngineError::PublishRejected("workflow has no nodes".to_string()));
        }
        let report = validate_graph(&self.graph);
        if !report.is_valid() {
            let messages: Vec<String> = report.errors().iter().map(|f| f.message.clone()).collect();
            return Err(EngineError::PublishRejected(messages.join("; ")));
        }

        self.save_workflow()?;
        let workflow = self.workflow_mut()?;
        workflow.status = WorkflowStatus::Published;
        log::info!("Published workflow '{}' v{}", workflow.id, workflow.version);
        Ok(workflow.clone())
    }

    pub fn archive_workflow(&mut self) -> Result<()> {
        let workflow = self.workflow.as_mut().ok_or(EngineError::NoWorkflow)?;
        workflow.status = WorkflowStatus::Archived;
        log::info!("Archived workflow '{}'", workflow.id);
        Ok(())
    }

    /// Drop the workflow, its graph, history and run state
    pub fn clear_workflow(&mut self) {
        *self = Self::new(self.history_limit);
    }

    fn workflow_mut(&mut self) -> Result<&mut WorkflowDefinition> {
        let workflow = self.workflow.as_mut().ok_or(EngineError::NoWorkflow)?;
        if workflow.is_archived() {
            return Err(EngineError::WorkflowArchived(workflow.id.clone()));
        }
        Ok(workflow)
    }

    pub fn workflow(&self) -> Option<&WorkflowDefinition> {
        self.workflow.as_ref()
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn selected_node(&self) -> Option<&WorkflowNode> {
        self.selected_node_id
            .as_deref()
            .and_then(|id| self.graph.find_node(id))
    }

    pub fn selected_edge(&self) -> Option<&WorkflowEdge> {
        self.selected_edge_id
            .as_deref()
            .and_then(|id| self.graph.find_edge(id))
    }

    // --- Graph editing ---

    pub fn set_nodes(&mut self, nodes: Vec<WorkflowNode>) -> Result<()> {
        self.graph.nodes = nodes;
        self.commit()
    }

    pub fn set_edges(&mut self, edges: Vec<WorkflowEdge>) -> Result<()> {
        self.graph.edges = edges;
        self.commit()
    }

    /// Add an idle node labelled from the catalog
    pub fn add_node(&mut self, node_type: NodeType, position: Position) -> Result<NodeId> {
        let label = descriptor::lookup(&node_type)
            .map(|m| m.label.to_string())
            .unwrap_or_else(|| node_type.to_string());
        let id = format!("{}-{}", node_type, uuid::Uuid::new_v4());
        let mut node = WorkflowNode::new(id.clone(), node_type, label);
        node.position = position;
        self.graph.nodes.push(node);
        self.commit()?;
        Ok(id)
    }

    /// Edit a node's data in place
    pub fn update_node(&mut self, node_id: &str, update: impl FnOnce(&mut NodeData)) -> Result<()> {
        let node = self
            .graph
            .find_node_mut(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
        update(&mut node.data);
        self.commit()
    }

    /// Remove a node and every edge touching it
    pub fn delete_node(&mut self, node_id: &str) -> Result<WorkflowNode> {
        let removed = self
            .graph
            .remove_node(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
        if self.selected_node_id.as_deref() == Some(node_id) {
            self.selected_node_id = None;
        }
        if let Some(edge_id) = &self.selected_edge_id {
            if self.graph.find_edge(edge_id).is_none() {
                self.selected_edge_id = None;
            }
        }
        self.commit()?;
        Ok(removed)
    }

    /// Copy a node next to the original and select the copy
    pub fn duplicate_node(&mut self, node_id: &str) -> Result<NodeId> {
        let original = self
            .graph
            .find_node(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;

        let mut copy = original.clone();
        copy.id = format!("{}-{}", copy.node_type, uuid::Uuid::new_v4());
        copy.position = original.position.offset(DUPLICATE_OFFSET, DUPLICATE_OFFSET);
        copy.data.label = format!("{} (Copy)", original.data.label);
        copy.reset();

        let id = copy.id.clone();
        self.graph.nodes.push(copy);
        self.selected_node_id = Some(id.clone());
        self.selected_edge_id = None;
        self.commit()?;
        Ok(id)
    }

    /// Connect two existing nodes
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        source_handle: Option<&str>,
        target_handle: Option<&str>,
    ) -> Result<EdgeId> {
        for endpoint in [source, target] {
            if self.graph.find_node(endpoint).is_none() {
                return Err(EngineError::NodeNotFound(endpoint.to_string()));
            }
        }
        let id = format!("edge-{}", uuid::Uuid::new_v4());
        let mut edge = WorkflowEdge::new(id.clone(), source, target);
        edge.source_handle = source_handle.map(str::to_string);
        edge.target_handle = target_handle.map(str::to_string);
        self.graph.edges.push(edge);
        self.commit()?;
        Ok(id)
    }

    pub fn delete_edge(&mut self, edge_id: &str) -> Result<WorkflowEdge> {
        let pos = self
            .graph
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| EngineError::EdgeNotFound(edge_id.to_string()))?;
        let removed = self.graph.edges.remove(pos);
        if self.selected_edge_id.as_deref() == Some(edge_id) {
            self.selected_edge_id = None;
        }
        self.commit()?;
        Ok(removed)
    }

    /// Select a node (clears edge selection)
    pub fn select_node(&mut self, node_id: Option<&str>) {
        self.selected_node_id = node_id.map(str::to_string);
        self.selected_edge_id = None;
    }

    /// Select an edge (clears node selection)
    pub fn select_edge(&mut self, edge_id: Option<&str>) {
        self.selected_edge_id = edge_id.map(str::to_string);
        self.selected_node_id = None;
    }

    // --- History ---

    fn commit(&mut self) -> Result<()> {
        self.history.record(&self.graph)
    }

    /// Restore the previous graph; false when there is nothing to undo
    pub fn undo(&mut self) -> Result<bool> {
        match self.history.undo() {
            Some(graph) => {
                self.graph = graph?;
                self.drop_stale_selection();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-apply an undone graph; false when there is nothing to redo
    pub fn redo(&mut self) -> Result<bool> {
        match self.history.redo() {
            Some(graph) => {
                self.graph = graph?;
                self.drop_stale_selection();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn drop_stale_selection(&mut self) {
        if self.selected_node().is_none() {
            self.selected_node_id = None;
        }
        if self.selected_edge().is_none() {
            self.selected_edge_id = None;
        }
    }

    // --- Run state ---

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        self.execution_status
    }

    /// Node most recently reported running
    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    pub fn execution_logs(&self) -> &[ExecutionLogEntry] {
        &self.execution_logs
    }

    pub fn pending_checkpoints(&self) -> &[HitlCheckpoint] {
        &self.pending_checkpoints
    }

    /// Reset run state for a new execution
    pub fn begin_execution(&mut self, execution_id: &str) {
        self.execution_id = Some(execution_id.to_string());
        self.execution_status = ExecutionStatus::Running;
        self.current_node_id = None;
        self.execution_logs.clear();
        self.pending_checkpoints.clear();
        self.graph.reset_statuses();
        self.graph.set_edges_animated(true);
    }

    pub fn pause_execution(&mut self) -> Result<()> {
        self.transition(ExecutionStatus::Paused)
    }

    pub fn resume_execution(&mut self) -> Result<()> {
        if self.execution_status != ExecutionStatus::Paused {
            return Err(EngineError::InvalidTransition {
                from: self.execution_status,
                to: ExecutionStatus::Running,
            });
        }
        self.transition(ExecutionStatus::Running)
    }

    pub fn stop_execution(&mut self) -> Result<()> {
        self.transition(ExecutionStatus::Stopped)?;
        self.current_node_id = None;
        self.graph.set_edges_animated(false);
        Ok(())
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.execution_status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.execution_status,
                to: next,
            });
        }
        self.execution_status = next;
        Ok(())
    }

    pub fn update_node_status(&mut self, node_id: &str, status: NodeStatus, data: Option<&NodeStatusData>) {
        let Some(node) = self.graph.find_node_mut(node_id) else {
            log::debug!("Status for unknown node '{}' ignored", node_id);
            return;
        };
        node.data.status = status;
        match (status, data) {
            (NodeStatus::Idle, _) => node.reset(),
            (_, Some(data)) => {
                if data.confidence_score.is_some() {
                    node.data.confidence_score = data.confidence_score;
                }
                node.data.error = data.error.clone();
            }
            (_, None) => node.data.error = None,
        }
        if status == NodeStatus::Running {
            self.current_node_id = Some(node_id.to_string());
        }
    }

    /// Append an audit entry, assigning an id if it has none
    pub fn add_execution_log(&mut self, entry: ExecutionLogEntry) {
        let entry = if entry.id.is_none() {
            entry.with_generated_id()
        } else {
            entry
        };
        self.execution_logs.push(entry);
    }

    pub fn add_checkpoint(&mut self, checkpoint: HitlCheckpoint) {
        self.pending_checkpoints.push(checkpoint);
        self.execution_status = ExecutionStatus::WaitingHitl;
    }

    /// Remove a decided checkpoint from the pending list
    ///
    /// The run returns to `running` once the last one is gone.
    pub fn resolve_checkpoint(&mut self, checkpoint_id: &str) -> Result<HitlCheckpoint> {
        let pos = self
            .pending_checkpoints
            .iter()
            .position(|c| c.id == checkpoint_id)
            .ok_or_else(|| EngineError::CheckpointNotFound(checkpoint_id.to_string()))?;
        let resolved = self.pending_checkpoints.remove(pos);
        self.execution_status = if self.pending_checkpoints.is_empty() {
            ExecutionStatus::Running
        } else {
            ExecutionStatus::WaitingHitl
        };
        Ok(resolved)
    }

    /// Mirror one engine event
    pub fn apply_event(&mut self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::ExecutionStarted { execution_id, .. } => self.begin_execution(execution_id),
            WorkflowEvent::ExecutionStatusChanged { status, .. } => {
                self.execution_status = *status;
                if status.is_terminal() {
                    self.current_node_id = None;
                }
            }
            WorkflowEvent::NodeStatusChanged { node_id, status, data } => {
                self.update_node_status(node_id, *status, data.as_ref())
            }
            WorkflowEvent::LogAppended { entry } => self.add_execution_log(entry.clone()),
            WorkflowEvent::CheckpointCreated { checkpoint } => self.add_checkpoint(checkpoint.clone()),
            WorkflowEvent::CheckpointResolved { checkpoint } => {
                if let Err(e) = self.resolve_checkpoint(&checkpoint.id) {
                    log::debug!("{}", e);
                }
            }
            WorkflowEvent::CheckpointEscalated { checkpoint } => {
                if let Some(pending) = self.pending_checkpoints.iter_mut().find(|c| c.id == checkpoint.id) {
                    *pending = checkpoint.clone();
                }
            }
            WorkflowEvent::EdgesAnimated { animated } => self.graph.set_edges_animated(*animated),
        }
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Event sink applying engine events to a shared store
#[derive(Clone)]
pub struct StoreEventSink {
    store: Arc<Mutex<WorkflowStore>>,
}

impl StoreEventSink {
    pub fn new(store: Arc<Mutex<WorkflowStore>>) -> Self {
        Self { store }
    }
}

impl EventSink for StoreEventSink {
    fn send(&self, event: WorkflowEvent) -> std::result::Result<(), EventError> {
        self.store.lock().apply_event(&event);
        Ok(())
    }
}
