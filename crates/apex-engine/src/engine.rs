//! Workflow execution engine
//!
//! Traverses a graph from its trigger nodes (nodes with no incoming
//! edge), dispatching each node to its registered handler and routing
//! along edges whose `sourceHandle` matches the handler's `nextPath`.
//!
//! Traversal is iterative: each trigger gets a work stack, and a
//! visited set shared by the whole run keeps any node from executing
//! twice. Nodes run one at a time; handler calls are awaited in place.
//!
//! Suspension points:
//! - awaiting a handler
//! - the pacing delay between a node and its successors
//! - the pause poll loop before each node
//!
//! A stop request is observed at node entry and before each descent.
//! It never aborts a handler call already in flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::ExecutionLogEntry;
use crate::checkpoint::{CheckpointContext, CheckpointDecision, CheckpointManager, HitlCheckpoint};
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, ExecutionSeed};
use crate::error::{EngineError, Result};
use crate::events::{EventSink, NullEventSink, WorkflowEvent};
use crate::registry::{HandlerResult, NodeRegistry};
use crate::types::{ExecutionStatus, NodeId, NodeStatus, WorkflowGraph};

fn emit(sink: &dyn EventSink, event: WorkflowEvent) {
    if let Err(e) = sink.send(event) {
        log::warn!("Failed to deliver workflow event: {}", e);
    }
}

struct ControlState {
    status: ExecutionStatus,
    execution_id: Option<String>,
}

struct ControlInner {
    paused: AtomicBool,
    stopped: AtomicBool,
    state: Mutex<ControlState>,
    sink: Arc<dyn EventSink>,
}

/// Cloneable handle for pausing, resuming and stopping a run
///
/// The engine itself is borrowed mutably for the duration of a run;
/// other tasks steer it through this handle.
#[derive(Clone)]
pub struct ExecutionControl {
    inner: Arc<ControlInner>,
}

impl ExecutionControl {
    fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                state: Mutex::new(ControlState {
                    status: ExecutionStatus::Idle,
                    execution_id: None,
                }),
                sink,
            }),
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.inner.state.lock().status
    }

    pub fn execution_id(&self) -> Option<String> {
        self.inner.state.lock().execution_id.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Park the run before its next node
    pub fn pause(&self) -> Result<()> {
        let execution_id = {
            let mut state = self.inner.state.lock();
            Self::check(&state, ExecutionStatus::Paused)?;
            state.status = ExecutionStatus::Paused;
            self.inner.paused.store(true, Ordering::SeqCst);
            state.execution_id.clone().unwrap_or_default()
        };
        self.report(&execution_id, ExecutionStatus::Paused);
        log::info!("Execution paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let execution_id = {
            let mut state = self.inner.state.lock();
            if state.status != ExecutionStatus::Paused {
                return Err(EngineError::InvalidTransition {
                    from: state.status,
                    to: ExecutionStatus::Running,
                });
            }
            state.status = ExecutionStatus::Running;
            self.inner.paused.store(false, Ordering::SeqCst);
            state.execution_id.clone().unwrap_or_default()
        };
        self.report(&execution_id, ExecutionStatus::Running);
        log::info!("Execution resumed");
        Ok(())
    }

    /// Stop the run; nodes not yet started stay idle
    pub fn stop(&self) -> Result<()> {
        let execution_id = {
            let mut state = self.inner.state.lock();
            Self::check(&state, ExecutionStatus::Stopped)?;
            state.status = ExecutionStatus::Stopped;
            self.inner.stopped.store(true, Ordering::SeqCst);
            self.inner.paused.store(false, Ordering::SeqCst);
            state.execution_id.clone().unwrap_or_default()
        };
        self.report(&execution_id, ExecutionStatus::Stopped);
        emit(
            self.inner.sink.as_ref(),
            WorkflowEvent::EdgesAnimated { animated: false },
        );
        log::info!("Execution stopped");
        Ok(())
    }

    /// Start a fresh run
    fn begin(&self, execution_id: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.status.is_active() {
                return Err(EngineError::ExecutionActive(state.status));
            }
            state.status = ExecutionStatus::Running;
            state.execution_id = Some(execution_id.to_string());
            self.inner.paused.store(false, Ordering::SeqCst);
            self.inner.stopped.store(false, Ordering::SeqCst);
        }
        self.report(execution_id, ExecutionStatus::Running);
        Ok(())
    }

    /// Apply a state-machine transition and report it
    fn transition(&self, next: ExecutionStatus) -> Result<()> {
        let execution_id = {
            let mut state = self.inner.state.lock();
            Self::check(&state, next)?;
            state.status = next;
            state.execution_id.clone().unwrap_or_default()
        };
        self.report(&execution_id, next);
        Ok(())
    }

    /// Settle the run's final status
    ///
    /// `None` while a pause is in effect: the run must park and retry.
    /// A stop wins over anything else.
    fn finish(&self, next: ExecutionStatus) -> Option<ExecutionStatus> {
        let execution_id = {
            let mut state = self.inner.state.lock();
            match state.status {
                ExecutionStatus::Stopped => return Some(ExecutionStatus::Stopped),
                ExecutionStatus::Paused => return None,
                _ => {}
            }
            if let Err(e) = Self::check(&state, next) {
                log::warn!("Could not settle execution status: {}", e);
                return Some(state.status);
            }
            state.status = next;
            state.execution_id.clone().unwrap_or_default()
        };
        self.report(&execution_id, next);
        Some(next)
    }

    fn check(state: &ControlState, next: ExecutionStatus) -> Result<()> {
        if state.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: state.status,
                to: next,
            })
        }
    }

    fn report(&self, execution_id: &str, status: ExecutionStatus) {
        emit(
            self.inner.sink.as_ref(),
            WorkflowEvent::execution_status(execution_id, status),
        );
    }
}

/// Result of a run or of a checkpoint resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub nodes_executed: usize,
    pub nodes_failed: usize,
    pub pending_checkpoints: usize,
    pub elapsed_ms: u64,
}

#[derive(Default)]
struct RunCounters {
    executed: usize,
    failed: usize,
    steps_exceeded: bool,
}

/// Executes workflow graphs
///
/// Owns the state of one run at a time: graph snapshot, context, audit
/// trail and checkpoints. Progress is reported through the event sink.
pub struct ExecutionEngine {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
    control: ExecutionControl,
    graph: WorkflowGraph,
    context: ExecutionContext,
    logs: Vec<ExecutionLogEntry>,
    checkpoints: CheckpointManager,
    visited: HashSet<NodeId>,
    counters: RunCounters,
    started_at: Option<Instant>,
}

impl ExecutionEngine {
    /// Create an engine with default config and no event sink
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        let sink: Arc<dyn EventSink> = Arc::new(NullEventSink);
        Self {
            registry,
            config: EngineConfig::default(),
            control: ExecutionControl::new(sink.clone()),
            sink,
            graph: WorkflowGraph::default(),
            context: ExecutionContext::default(),
            logs: Vec::new(),
            checkpoints: CheckpointManager::new(),
            visited: HashSet::new(),
            counters: RunCounters::default(),
            started_at: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the event sink
    ///
    /// Replaces the control handle; take `control()` after this call.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.control = ExecutionControl::new(sink.clone());
        self.sink = sink;
        self
    }

    pub fn control(&self) -> ExecutionControl {
        self.control.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> ExecutionStatus {
        self.control.status()
    }

    pub fn execution_id(&self) -> Option<String> {
        self.control.execution_id()
    }

    /// Graph snapshot with the statuses of the current run
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Audit trail of the current run
    pub fn logs(&self) -> &[ExecutionLogEntry] {
        &self.logs
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn pending_checkpoints(&self) -> Vec<&HitlCheckpoint> {
        self.checkpoints.pending()
    }

    pub fn pause(&self) -> Result<()> {
        self.control.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.control.resume()
    }

    /// Stop the current run, or abandon one waiting on review
    pub fn stop(&mut self) -> Result<()> {
        self.control.stop()?;
        self.graph.set_edges_animated(false);
        Ok(())
    }

    /// Run a graph from its trigger nodes
    ///
    /// Resets every node to idle and discards the previous run's context,
    /// logs and checkpoints. Returns once every branch has completed,
    /// failed or suspended at a checkpoint (or the run was stopped).
    pub async fn start_execution(&mut self, graph: WorkflowGraph, seed: ExecutionSeed) -> Result<ExecutionSummary> {
        let status = self.control.status();
        if status.is_active() {
            return Err(EngineError::ExecutionActive(status));
        }

        let triggers: Vec<NodeId> = graph.trigger_nodes().iter().map(|n| n.id.clone()).collect();
        if triggers.is_empty() {
            return Err(EngineError::NoTriggerNodes);
        }

        let execution_id = format!("exec-{}", uuid::Uuid::new_v4());
        self.graph = graph;
        self.graph.reset_statuses();
        self.graph.set_edges_animated(true);
        self.context = ExecutionContext::seeded(&execution_id, &seed);
        self.logs.clear();
        self.checkpoints.clear();
        self.visited.clear();
        self.counters = RunCounters::default();
        self.started_at = Some(Instant::now());

        for node in &self.graph.nodes {
            emit(self.sink.as_ref(), WorkflowEvent::node_status(&node.id, NodeStatus::Idle));
        }
        emit(self.sink.as_ref(), WorkflowEvent::EdgesAnimated { animated: true });
        emit(
            self.sink.as_ref(),
            WorkflowEvent::ExecutionStarted {
                execution_id: execution_id.clone(),
                trigger_count: triggers.len(),
            },
        );
        self.control.begin(&execution_id)?;

        log::info!(
            "Execution {} started: {} nodes, {} trigger(s)",
            execution_id,
            self.graph.nodes.len(),
            triggers.len()
        );

        for trigger in triggers {
            if self.control.is_stopped() || self.counters.steps_exceeded {
                break;
            }
            self.traverse(vec![trigger]).await;
        }

        Ok(self.finish().await)
    }

    /// Apply a reviewer decision to a pending checkpoint
    ///
    /// Approve marks the node completed and continues along its `"true"`
    /// (and unlabelled) edges. Reject marks the node as errored; only
    /// edges explicitly labelled `"false"` are followed, so without one
    /// the branch ends there.
    pub async fn resolve_checkpoint(
        &mut self,
        checkpoint_id: &str,
        decision: CheckpointDecision,
        reason: Option<String>,
    ) -> Result<ExecutionSummary> {
        self.resolve_checkpoint_by(checkpoint_id, decision, reason, None)
            .await
    }

    /// Like [`resolve_checkpoint`](Self::resolve_checkpoint), recording the reviewer
    pub async fn resolve_checkpoint_by(
        &mut self,
        checkpoint_id: &str,
        decision: CheckpointDecision,
        reason: Option<String>,
        reviewer: Option<String>,
    ) -> Result<ExecutionSummary> {
        let now = Utc::now();
        let input = self.context.snapshot();
        let checkpoint = self
            .checkpoints
            .resolve(checkpoint_id, decision, reason, reviewer, now)?;
        emit(
            self.sink.as_ref(),
            WorkflowEvent::CheckpointResolved {
                checkpoint: checkpoint.clone(),
            },
        );

        let node_id = checkpoint.node_id.clone();
        let output = json!({
            "checkpointId": checkpoint.id,
            "decision": decision.as_str(),
            "reason": checkpoint.reason,
            "resolvedBy": checkpoint.completed_by,
        });

        let (status, error, next) = match decision {
            CheckpointDecision::Approve => (
                NodeStatus::Completed,
                None,
                self.graph.next_targets(&node_id, Some("true")),
            ),
            CheckpointDecision::Reject => (
                NodeStatus::Error,
                Some(match &checkpoint.reason {
                    Some(reason) => format!("Rejected by reviewer: {}", reason),
                    None => "Rejected by reviewer".to_string(),
                }),
                self.graph.handle_targets(&node_id, "false"),
            ),
        };

        self.set_node_status(&node_id, status, None, error.clone());
        self.append_log(ExecutionLogEntry {
            id: None,
            execution_id: checkpoint.execution_id.clone(),
            node_id: node_id.clone(),
            node_name: checkpoint.node_name.clone(),
            timestamp: now,
            status,
            input,
            output: output.clone(),
            duration_ms: 0,
            confidence_score: None,
            error,
        });
        self.context.record_output(&node_id, output);

        if self.control.status() != ExecutionStatus::WaitingHitl {
            // Stopped runs record the decision but never resume
            self.graph.set_edges_animated(false);
            return Ok(self.summary());
        }

        self.control.transition(ExecutionStatus::Running)?;
        log::debug!(
            "Resuming after checkpoint '{}' with {} successor(s)",
            checkpoint_id,
            next.len()
        );
        self.traverse(next).await;
        Ok(self.finish().await)
    }

    /// Mark one checkpoint escalated
    pub fn escalate_checkpoint(&mut self, checkpoint_id: &str) -> Result<HitlCheckpoint> {
        let checkpoint = self.checkpoints.escalate(checkpoint_id)?;
        emit(
            self.sink.as_ref(),
            WorkflowEvent::CheckpointEscalated {
                checkpoint: checkpoint.clone(),
            },
        );
        Ok(checkpoint)
    }

    /// Escalate every pending checkpoint whose `escalateAt` is at or before `now`
    pub fn escalate_overdue(&mut self, now: DateTime<Utc>) -> Vec<HitlCheckpoint> {
        let escalated = self.checkpoints.escalate_overdue(now);
        for checkpoint in &escalated {
            emit(
                self.sink.as_ref(),
                WorkflowEvent::CheckpointEscalated {
                    checkpoint: checkpoint.clone(),
                },
            );
        }
        escalated
    }

    /// Depth-first walk from `roots`
    async fn traverse(&mut self, roots: Vec<NodeId>) {
        let mut stack: Vec<NodeId> = roots.into_iter().rev().collect();

        while let Some(node_id) = stack.pop() {
            if !self.wait_while_paused().await {
                log::debug!("Stop observed before node '{}'", node_id);
                return;
            }
            if self.visited.contains(&node_id) {
                continue;
            }
            if self.counters.executed >= self.config.max_steps {
                log::error!(
                    "Execution step limit reached ({} nodes); abandoning traversal",
                    self.config.max_steps
                );
                self.counters.steps_exceeded = true;
                return;
            }
            self.visited.insert(node_id.clone());

            let next = self.execute_node(&node_id).await;
            if next.is_empty() {
                continue;
            }

            let delay = self.config.step_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.control.is_stopped() {
                log::debug!("Stop observed after node '{}'", node_id);
                return;
            }
            stack.extend(next.into_iter().rev());
        }
    }

    /// Execute one node and return the successors to visit
    async fn execute_node(&mut self, node_id: &str) -> Vec<NodeId> {
        let Some(node) = self.graph.find_node(node_id).cloned() else {
            log::warn!("Node '{}' vanished from the graph", node_id);
            return Vec::new();
        };

        self.set_node_status(node_id, NodeStatus::Running, None, None);
        log::debug!("Executing node '{}' ({})", node_id, node.node_type);

        let input = self.context.snapshot();
        let timestamp = Utc::now();
        let started = Instant::now();

        let result = match self.registry.get_handler(&node.node_type) {
            Some(handler) => match handler.execute(&node, &self.context).await {
                Ok(result) => result,
                Err(e) => HandlerResult::failure(e.to_string()),
            },
            None => HandlerResult::failure(format!(
                "No handler registered for node type '{}'",
                node.node_type
            )),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.counters.executed += 1;

        let status = if result.hitl_required {
            NodeStatus::Paused
        } else if result.success {
            NodeStatus::Completed
        } else {
            NodeStatus::Error
        };
        let error = (status == NodeStatus::Error).then(|| {
            result
                .error
                .clone()
                .unwrap_or_else(|| "Node execution failed".to_string())
        });

        self.append_log(ExecutionLogEntry {
            id: None,
            execution_id: self.execution_id().unwrap_or_default(),
            node_id: node_id.to_string(),
            node_name: node.data.label.clone(),
            timestamp,
            status,
            input,
            output: result.output.clone(),
            duration_ms,
            confidence_score: result.confidence_score,
            error: error.clone(),
        });
        self.context.record_output(node_id, result.output.clone());
        self.set_node_status(node_id, status, result.confidence_score, error.clone());

        match status {
            NodeStatus::Paused => {
                let checkpoint = HitlCheckpoint::for_node(
                    &self.execution_id().unwrap_or_default(),
                    &node,
                    self.checkpoint_context(),
                    self.config.checkpoint_timers(),
                    Utc::now(),
                );
                self.checkpoints.insert(checkpoint.clone());
                emit(self.sink.as_ref(), WorkflowEvent::CheckpointCreated { checkpoint });
                Vec::new()
            }
            NodeStatus::Completed => {
                let next = self.graph.next_targets(node_id, result.next_path.as_deref());
                log::debug!(
                    "Node '{}' completed in {}ms; path {:?} -> {:?}",
                    node_id,
                    duration_ms,
                    result.next_path,
                    next
                );
                next
            }
            _ => {
                self.counters.failed += 1;
                log::warn!(
                    "Node '{}' failed: {}",
                    node_id,
                    error.as_deref().unwrap_or_default()
                );
                Vec::new()
            }
        }
    }

    /// Reviewer context: claim identity plus the latest AI recommendation
    fn checkpoint_context(&self) -> CheckpointContext {
        let recommendation = self
            .logs
            .iter()
            .rev()
            .find(|entry| entry.output.get("recommendation").is_some());
        let confidence_score = recommendation
            .and_then(|entry| entry.confidence_score)
            .or_else(|| self.logs.iter().rev().find_map(|entry| entry.confidence_score));

        CheckpointContext {
            claim_id: self.context.claim_id().map(str::to_string),
            member_id: self.context.member_id().map(str::to_string),
            ai_recommendation: recommendation.map(|entry| entry.output.clone()),
            confidence_score,
            previous_decisions: self.checkpoints.decisions(),
        }
    }

    /// Block while paused; false once the run is stopped
    async fn wait_while_paused(&self) -> bool {
        loop {
            if self.control.is_stopped() {
                return false;
            }
            if !self.control.is_paused() {
                return true;
            }
            tokio::time::sleep(self.config.pause_poll_interval()).await;
        }
    }

    async fn finish(&mut self) -> ExecutionSummary {
        let target = if self.checkpoints.has_pending() {
            ExecutionStatus::WaitingHitl
        } else if self.counters.failed > 0 || self.counters.steps_exceeded {
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Completed
        };

        // A paused run settles only after resume or stop
        let status = loop {
            self.wait_while_paused().await;
            if let Some(status) = self.control.finish(target) {
                break status;
            }
        };
        if status != ExecutionStatus::WaitingHitl {
            self.graph.set_edges_animated(false);
            if status != ExecutionStatus::Stopped {
                emit(self.sink.as_ref(), WorkflowEvent::EdgesAnimated { animated: false });
            }
        }

        let summary = self.summary();
        log::info!(
            "Execution {} {:?}: {} executed, {} failed, {} pending review ({}ms)",
            summary.execution_id,
            summary.status,
            summary.nodes_executed,
            summary.nodes_failed,
            summary.pending_checkpoints,
            summary.elapsed_ms
        );
        summary
    }

    fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            execution_id: self.execution_id().unwrap_or_default(),
            status: self.control.status(),
            nodes_executed: self.counters.executed,
            nodes_failed: self.counters.failed,
            pending_checkpoints: self.checkpoints.pending_count(),
            elapsed_ms: self
                .started_at
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    fn set_node_status(
        &mut self,
        node_id: &str,
        status: NodeStatus,
        confidence_score: Option<f64>,
        error: Option<String>,
    ) {
        if let Some(node) = self.graph.find_node_mut(node_id) {
            node.data.status = status;
            if confidence_score.is_some() {
                node.data.confidence_score = confidence_score;
            }
            node.data.error = error.clone();
        }
        emit(
            self.sink.as_ref(),
            WorkflowEvent::node_status_with(node_id, status, confidence_score, error),
        );
    }

    fn append_log(&mut self, entry: ExecutionLogEntry) {
        emit(self.sink.as_ref(), WorkflowEvent::LogAppended { entry: entry.clone() });
        self.logs.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::checkpoint::CheckpointStatus;
    use crate::events::VecEventSink;
    use crate::node_config::NodeConfig;
    use crate::types::NodeType;
    use serde_json::json;

    /// Registry with simple stand-ins for the node types the tests use
    fn test_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        for trigger in [NodeType::ClaimIntake, NodeType::Webhook] {
            registry.register_sync(trigger, |_, _| Ok(HandlerResult::ok(json!({ "triggered": true }))));
        }
        for linear in [NodeType::MedicalCoding, NodeType::AuditLog, NodeType::DecisionOutput, NodeType::Notification] {
            registry.register_sync(linear, |node, _| Ok(HandlerResult::ok(json!({ "node": node.id }))));
        }
        registry.register_sync(NodeType::DecisionBranch, |node, ctx| {
            let met = match &node.data.config {
                NodeConfig::Decision(config) => config.all_conditions().iter().all(|c| c.evaluate(ctx)),
                _ => true,
            };
            Ok(HandlerResult::ok(json!({ "conditionMet": met })).with_branch(met))
        });
        registry.register_sync(NodeType::HitlCheckpoint, |_, _| {
            Ok(HandlerResult::ok(json!({ "requiresHumanReview": true })).requiring_review())
        });
        registry.register_sync(NodeType::PolicyEngine, |_, _| Ok(HandlerResult::failure("policy service unavailable")));
        registry.register_sync(NodeType::FraudDetector, |_, _| Err(EngineError::failed("boom")));
        registry
    }

    fn engine_with(registry: NodeRegistry) -> (ExecutionEngine, Arc<VecEventSink>) {
        let sink = Arc::new(VecEventSink::new());
        let engine = ExecutionEngine::new(Arc::new(registry))
            .with_config(EngineConfig::immediate())
            .with_event_sink(sink.clone());
        (engine, sink)
    }

    fn branch_graph() -> WorkflowGraph {
        WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("branch", NodeType::DecisionBranch)
            .with_config(json!({ "conditionField": "amount", "operator": "greaterThan", "compareValue": "1000" }))
            .add_node("high", NodeType::Notification)
            .add_node("low", NodeType::DecisionOutput)
            .connect("intake", "branch")
            .connect_handle("branch", "true", "high")
            .connect_handle("branch", "false", "low")
            .build()
    }

    fn status_of(engine: &ExecutionEngine, id: &str) -> NodeStatus {
        engine.graph().find_node(id).unwrap().data.status
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let (mut engine, sink) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("code", NodeType::MedicalCoding)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "code")
            .connect("code", "audit")
            .build();

        let summary = engine
            .start_execution(graph, ExecutionSeed::new().claim("CLM-1"))
            .await
            .unwrap();

        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(summary.nodes_executed, 3);
        let order: Vec<&str> = engine.logs().iter().map(|l| l.node_id.as_str()).collect();
        assert_eq!(order, vec!["intake", "code", "audit"]);
        assert_eq!(engine.context().output_of("code"), Some(&json!({ "node": "code" })));
        assert_eq!(engine.context().last_output(), Some(&json!({ "node": "audit" })));
        assert_eq!(
            sink.node_statuses("code"),
            vec![NodeStatus::Idle, NodeStatus::Running, NodeStatus::Completed]
        );
        assert!(engine.graph().edges.iter().all(|e| !e.animated));
    }

    #[tokio::test]
    async fn test_log_input_is_context_before_node() {
        let (mut engine, _) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "audit")
            .build();
        engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();

        let audit = &engine.logs()[1];
        assert_eq!(audit.input["lastOutput"], json!({ "triggered": true }));
        assert!(audit.input.get("audit_output").is_none());
    }

    #[tokio::test]
    async fn test_branch_routing() {
        let (mut engine, _) = engine_with(test_registry());
        let seed = ExecutionSeed::new().var("amount", json!(5000));
        engine.start_execution(branch_graph(), seed).await.unwrap();
        assert_eq!(status_of(&engine, "high"), NodeStatus::Completed);
        assert_eq!(status_of(&engine, "low"), NodeStatus::Idle);

        let seed = ExecutionSeed::new().var("amount", json!(100));
        engine.start_execution(branch_graph(), seed).await.unwrap();
        assert_eq!(status_of(&engine, "high"), NodeStatus::Idle);
        assert_eq!(status_of(&engine, "low"), NodeStatus::Completed);
    }

    #[tokio::test]
    async fn test_no_trigger_fails_fast() {
        let (mut engine, _) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("a", NodeType::MedicalCoding)
            .add_node("b", NodeType::AuditLog)
            .connect("a", "b")
            .connect("b", "a")
            .build();

        let result = engine.start_execution(graph, ExecutionSeed::new()).await;
        assert!(matches!(result, Err(EngineError::NoTriggerNodes)));
        assert_eq!(engine.status(), ExecutionStatus::Idle);
    }

    #[tokio::test]
    async fn test_failure_ends_only_its_branch() {
        let (mut engine, _) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("policy", NodeType::PolicyEngine)
            .add_node("after-policy", NodeType::DecisionOutput)
            .add_node("fraud", NodeType::FraudDetector)
            .add_node("after-fraud", NodeType::Notification)
            .add_node("hook", NodeType::Webhook)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "policy")
            .connect("policy", "after-policy")
            .connect("intake", "fraud")
            .connect("fraud", "after-fraud")
            .connect("hook", "audit")
            .build();

        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();

        assert_eq!(summary.status, ExecutionStatus::Error);
        assert_eq!(summary.nodes_failed, 2);
        assert_eq!(status_of(&engine, "policy"), NodeStatus::Error);
        assert_eq!(status_of(&engine, "after-policy"), NodeStatus::Idle);
        assert_eq!(status_of(&engine, "fraud"), NodeStatus::Error);
        assert_eq!(status_of(&engine, "after-fraud"), NodeStatus::Idle);
        assert_eq!(status_of(&engine, "audit"), NodeStatus::Completed);

        let policy_log = engine.logs().iter().find(|l| l.node_id == "policy").unwrap();
        assert_eq!(policy_log.error.as_deref(), Some("policy service unavailable"));
        let fraud_log = engine.logs().iter().find(|l| l.node_id == "fraud").unwrap();
        assert!(fraud_log.error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_unregistered_type_fails_node() {
        let (mut engine, _) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("mystery", NodeType::from("teleport"))
            .connect("intake", "mystery")
            .build();

        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        assert_eq!(summary.status, ExecutionStatus::Error);
        let log = engine.logs().last().unwrap();
        assert!(log.error.as_deref().unwrap().contains("teleport"));
    }

    #[tokio::test]
    async fn test_shared_successor_runs_once() {
        let (mut engine, _) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("a", NodeType::MedicalCoding)
            .add_node("b", NodeType::Notification)
            .add_node("join", NodeType::AuditLog)
            .connect("intake", "a")
            .connect("intake", "b")
            .connect("a", "join")
            .connect("b", "join")
            .build();

        engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        let order: Vec<&str> = engine.logs().iter().map(|l| l.node_id.as_str()).collect();
        assert_eq!(order, vec!["intake", "a", "join", "b"]);
    }

    #[tokio::test]
    async fn test_hitl_suspends_and_approve_resumes() {
        let (mut engine, sink) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("review", NodeType::HitlCheckpoint)
            .with_config(json!({ "reviewer": "clinical-team", "slaHours": 4 }))
            .add_node("approved", NodeType::DecisionOutput)
            .add_node("denied", NodeType::Notification)
            .connect("intake", "review")
            .connect_handle("review", "true", "approved")
            .connect_handle("review", "false", "denied")
            .build();

        let summary = engine
            .start_execution(graph, ExecutionSeed::new().claim("CLM-7").member("M-3"))
            .await
            .unwrap();

        assert_eq!(summary.status, ExecutionStatus::WaitingHitl);
        assert_eq!(summary.pending_checkpoints, 1);
        assert_eq!(status_of(&engine, "review"), NodeStatus::Paused);
        assert_eq!(status_of(&engine, "approved"), NodeStatus::Idle);
        assert!(engine.graph().edges.iter().all(|e| e.animated));

        let pending = engine.pending_checkpoints();
        assert_eq!(pending.len(), 1);
        let checkpoint = pending[0].clone();
        assert_eq!(checkpoint.node_id, "review");
        assert_eq!(checkpoint.assignee.id, "clinical-team");
        assert_eq!(checkpoint.context.claim_id.as_deref(), Some("CLM-7"));

        let summary = engine
            .resolve_checkpoint(&checkpoint.id, CheckpointDecision::Approve, None)
            .await
            .unwrap();

        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(status_of(&engine, "review"), NodeStatus::Completed);
        assert_eq!(status_of(&engine, "approved"), NodeStatus::Completed);
        assert_eq!(status_of(&engine, "denied"), NodeStatus::Idle);
        assert_eq!(
            engine.checkpoints().get(&checkpoint.id).unwrap().status,
            CheckpointStatus::Approved
        );
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::CheckpointResolved { .. })));

        let again = engine
            .resolve_checkpoint(&checkpoint.id, CheckpointDecision::Reject, None)
            .await;
        assert!(matches!(again, Err(EngineError::CheckpointAlreadyResolved(_))));
    }

    #[tokio::test]
    async fn test_reject_follows_false_path_only() {
        let (mut engine, _) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("review", NodeType::HitlCheckpoint)
            .add_node("approved", NodeType::DecisionOutput)
            .add_node("denied", NodeType::Notification)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "review")
            .connect_handle("review", "true", "approved")
            .connect_handle("review", "false", "denied")
            .connect("review", "audit")
            .build();

        engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        let id = engine.pending_checkpoints()[0].id.clone();
        let summary = engine
            .resolve_checkpoint(&id, CheckpointDecision::Reject, Some("not covered".into()))
            .await
            .unwrap();

        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(status_of(&engine, "review"), NodeStatus::Error);
        assert_eq!(status_of(&engine, "denied"), NodeStatus::Completed);
        assert_eq!(status_of(&engine, "approved"), NodeStatus::Idle);
        assert_eq!(status_of(&engine, "audit"), NodeStatus::Idle);
        let review = engine.graph().find_node("review").unwrap();
        assert_eq!(review.data.error.as_deref(), Some("Rejected by reviewer: not covered"));
    }

    #[tokio::test]
    async fn test_waiting_until_last_checkpoint_resolved() {
        let (mut engine, _) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("r1", NodeType::HitlCheckpoint)
            .add_node("r2", NodeType::HitlCheckpoint)
            .connect("intake", "r1")
            .connect("intake", "r2")
            .build();

        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        assert_eq!(summary.pending_checkpoints, 2);

        let ids: Vec<String> = engine.pending_checkpoints().iter().map(|c| c.id.clone()).collect();
        let first = engine
            .resolve_checkpoint(&ids[0], CheckpointDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(first.status, ExecutionStatus::WaitingHitl);

        let second = engine
            .resolve_checkpoint(&ids[1], CheckpointDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(second.status, ExecutionStatus::Completed);
        assert_eq!(
            engine.checkpoints().get(&ids[1]).unwrap().context.previous_decisions,
            Vec::<String>::new()
        );
    }

    #[tokio::test]
    async fn test_stop_mid_run_leaves_rest_idle() {
        let mut registry = test_registry();
        let (mut engine, sink) = engine_with(NodeRegistry::new());
        let control = engine.control();
        registry.register_fn(NodeType::MedicalCoding, move |_, _| {
            let control = control.clone();
            async move {
                control.stop()?;
                Ok(HandlerResult::ok(json!({ "finished": true })))
            }
        });
        engine.registry = Arc::new(registry);

        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("code", NodeType::MedicalCoding)
            .add_node("audit", NodeType::AuditLog)
            .add_node("out", NodeType::DecisionOutput)
            .connect("intake", "code")
            .connect("code", "audit")
            .connect("audit", "out")
            .build();

        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();

        assert_eq!(summary.status, ExecutionStatus::Stopped);
        // The in-flight handler finished normally
        assert_eq!(status_of(&engine, "code"), NodeStatus::Completed);
        assert_eq!(status_of(&engine, "audit"), NodeStatus::Idle);
        assert_eq!(status_of(&engine, "out"), NodeStatus::Idle);
        assert_eq!(sink.node_statuses("audit"), vec![NodeStatus::Idle]);
        assert!(engine.graph().edges.iter().all(|e| !e.animated));
        assert!(sink
            .events()
            .contains(&WorkflowEvent::EdgesAnimated { animated: false }));
    }

    #[tokio::test]
    async fn test_pause_blocks_until_resume() {
        let mut registry = test_registry();
        let sink = Arc::new(VecEventSink::new());
        let mut engine = ExecutionEngine::new(Arc::new(NodeRegistry::new()))
            .with_config(EngineConfig::immediate())
            .with_event_sink(sink.clone());
        let control = engine.control();
        let pauser = control.clone();
        registry.register_sync(NodeType::MedicalCoding, move |_, _| {
            pauser.pause()?;
            Ok(HandlerResult::ok(json!({})))
        });
        engine.registry = Arc::new(registry);

        let resumer = tokio::spawn(async move {
            while control.status() != ExecutionStatus::Paused {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            control.resume().unwrap();
        });

        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("code", NodeType::MedicalCoding)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "code")
            .connect("code", "audit")
            .build();

        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        resumer.await.unwrap();

        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(status_of(&engine, "audit"), NodeStatus::Completed);

        let statuses: Vec<ExecutionStatus> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::ExecutionStatusChanged { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                ExecutionStatus::Running,
                ExecutionStatus::Paused,
                ExecutionStatus::Running,
                ExecutionStatus::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_while_paused() {
        let mut registry = test_registry();
        let mut engine = ExecutionEngine::new(Arc::new(NodeRegistry::new()))
            .with_config(EngineConfig::immediate());
        let control = engine.control();
        let pauser = control.clone();
        registry.register_sync(NodeType::MedicalCoding, move |_, _| {
            pauser.pause()?;
            Ok(HandlerResult::ok(json!({})))
        });
        engine.registry = Arc::new(registry);

        let stopper = tokio::spawn(async move {
            while control.status() != ExecutionStatus::Paused {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
            control.stop().unwrap();
        });

        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("code", NodeType::MedicalCoding)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "code")
            .connect("code", "audit")
            .build();

        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        stopper.await.unwrap();

        assert_eq!(summary.status, ExecutionStatus::Stopped);
        assert_eq!(status_of(&engine, "audit"), NodeStatus::Idle);
        assert!(engine.resume().is_err());
    }

    #[tokio::test]
    async fn test_restart_resets_state() {
        let (mut engine, sink) = engine_with(test_registry());
        let seed = ExecutionSeed::new().var("amount", json!(5000));
        engine.start_execution(branch_graph(), seed).await.unwrap();
        assert_eq!(engine.logs().len(), 3);

        sink.clear();
        let mut graph = engine.graph().clone();
        graph.find_node_mut("branch").unwrap().data.config = NodeConfig::Decision(Default::default());
        engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();

        // Every node was reset before the first one ran
        let events = sink.events();
        let first_running = events
            .iter()
            .position(|e| matches!(e, WorkflowEvent::NodeStatusChanged { status: NodeStatus::Running, .. }))
            .unwrap();
        let idle_resets = events[..first_running]
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::NodeStatusChanged { status: NodeStatus::Idle, .. }))
            .count();
        assert_eq!(idle_resets, 4);
        assert_eq!(engine.logs().len(), 3);
        assert!(engine.context().get("amount").is_none());
    }

    #[tokio::test]
    async fn test_escalation_emits_events() {
        let (mut engine, sink) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("review", NodeType::HitlCheckpoint)
            .with_config(json!({ "escalationHours": 1 }))
            .connect("intake", "review")
            .build();
        engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();

        assert!(engine.escalate_overdue(Utc::now()).is_empty());
        let escalated = engine.escalate_overdue(Utc::now() + chrono::Duration::hours(2));
        assert_eq!(escalated.len(), 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::CheckpointEscalated { .. })));

        // Still resolvable after escalation
        let id = escalated[0].id.clone();
        let summary = engine
            .resolve_checkpoint(&id, CheckpointDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(summary.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_checkpoint_context_carries_recommendation() {
        let mut registry = test_registry();
        registry.register_sync(NodeType::GeminiAnalyzer, |_, _| {
            Ok(HandlerResult::ok(json!({ "recommendation": "approve", "reasoning": "meets criteria" }))
                .with_confidence(0.89))
        });
        let (mut engine, _) = engine_with(registry);
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("ai", NodeType::GeminiAnalyzer)
            .add_node("review", NodeType::HitlCheckpoint)
            .connect("intake", "ai")
            .connect("ai", "review")
            .build();

        engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        let checkpoint = engine.pending_checkpoints()[0];
        assert_eq!(checkpoint.context.confidence_score, Some(0.89));
        assert_eq!(
            checkpoint.context.ai_recommendation.as_ref().unwrap()["recommendation"],
            "approve"
        );
    }

    /// Holds up delivery of `Paused` status events, as a sink behind a busy lock would
    struct SlowPauseSink {
        events: VecEventSink,
    }

    impl EventSink for SlowPauseSink {
        fn send(&self, event: WorkflowEvent) -> std::result::Result<(), crate::events::EventError> {
            if matches!(
                event,
                WorkflowEvent::ExecutionStatusChanged {
                    status: ExecutionStatus::Paused,
                    ..
                }
            ) {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            self.events.send(event)
        }
    }

    /// Engine whose last node (`audit`) flags entry and then takes 100ms
    fn slow_tail_engine() -> (ExecutionEngine, Arc<AtomicBool>) {
        let entered = Arc::new(AtomicBool::new(false));
        let flag = entered.clone();
        let mut registry = test_registry();
        registry.register_fn(NodeType::AuditLog, move |_, _| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                Ok(HandlerResult::ok(json!({ "logged": true })))
            }
        });
        let engine = ExecutionEngine::new(Arc::new(registry))
            .with_config(EngineConfig::immediate())
            .with_event_sink(Arc::new(SlowPauseSink {
                events: VecEventSink::new(),
            }));
        (engine, entered)
    }

    fn tail_graph() -> WorkflowGraph {
        WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "audit")
            .build()
    }

    fn wait_for(flag: &AtomicBool) {
        while !flag.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_during_last_node_parks_run() {
        let (mut engine, entered) = slow_tail_engine();
        let control = engine.control();

        let pauser = std::thread::spawn(move || {
            wait_for(&entered);
            control.pause().unwrap();
            // The last handler has returned by now
            std::thread::sleep(std::time::Duration::from_millis(50));
            let parked = control.status();
            control.resume().unwrap();
            parked
        });

        let summary = engine.start_execution(tail_graph(), ExecutionSeed::new()).await.unwrap();
        let parked = pauser.join().unwrap();

        assert_eq!(parked, ExecutionStatus::Paused);
        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(engine.status(), ExecutionStatus::Completed);
        assert!(!engine.control().is_paused());
        assert!(engine.graph().edges.iter().all(|e| !e.animated));

        let again = engine.start_execution(tail_graph(), ExecutionSeed::new()).await.unwrap();
        assert_eq!(again.status, ExecutionStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_during_last_node_settles_stopped() {
        let (mut engine, entered) = slow_tail_engine();
        let control = engine.control();

        let stopper = std::thread::spawn(move || {
            wait_for(&entered);
            control.stop().unwrap();
        });

        let summary = engine.start_execution(tail_graph(), ExecutionSeed::new()).await.unwrap();
        stopper.join().unwrap();

        assert_eq!(summary.status, ExecutionStatus::Stopped);
        assert_eq!(status_of(&engine, "audit"), NodeStatus::Completed);
        assert!(engine.graph().edges.iter().all(|e| !e.animated));
        assert!(engine.pause().is_err());

        let again = engine.start_execution(tail_graph(), ExecutionSeed::new()).await.unwrap();
        assert_eq!(again.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_stop_while_waiting_clears_animation() {
        let (mut engine, sink) = engine_with(test_registry());
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("review", NodeType::HitlCheckpoint)
            .connect("intake", "review")
            .build();

        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();
        assert_eq!(summary.status, ExecutionStatus::WaitingHitl);
        assert!(engine.graph().edges.iter().all(|e| e.animated));

        engine.stop().unwrap();
        assert_eq!(engine.status(), ExecutionStatus::Stopped);
        assert!(engine.graph().edges.iter().all(|e| !e.animated));
        assert_eq!(
            sink.events().last(),
            Some(&WorkflowEvent::EdgesAnimated { animated: false })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_delay_paces_descent() {
        let config = EngineConfig {
            step_delay_ms: 500,
            ..EngineConfig::immediate()
        };
        let mut engine = ExecutionEngine::new(Arc::new(test_registry())).with_config(config);
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("code", NodeType::MedicalCoding)
            .add_node("audit", NodeType::AuditLog)
            .connect("intake", "code")
            .connect("code", "audit")
            .build();

        let started = tokio::time::Instant::now();
        let summary = engine.start_execution(graph, ExecutionSeed::new()).await.unwrap();

        assert_eq!(summary.status, ExecutionStatus::Completed);
        // One delay per descent; none after the leaf
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_millis(1000));
        assert!(elapsed < std::time::Duration::from_millis(1500));
    }
}
