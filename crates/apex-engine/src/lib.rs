//! Apex Engine - claims workflow execution
//!
//! Runs directed graphs of typed nodes (intake, eligibility, policy,
//! AI analysis, decisions, human review, outputs) against a shared
//! execution context. It supports:
//!
//! - Conditional routing along `true`/`false` (and named) edge handles
//! - Human-in-the-loop checkpoints that suspend a branch until decided
//! - Pause, resume and stop from outside the running task
//! - Structural validation before a run or publish
//! - Compressed snapshot-based undo/redo for graph edits
//!
//! # Architecture
//!
//! - `ExecutionEngine`: depth-first traversal from trigger nodes
//! - `NodeRegistry`: node type -> handler dispatch table
//! - `CheckpointManager`: review lifecycle, SLA and escalation
//! - `WorkflowStore`: host-side state mirroring engine events
//! - `EventSink`: event streaming, independent of any UI
//!
//! # Example
//!
//! ```ignore
//! use apex_engine::{ExecutionEngine, ExecutionSeed, WorkflowBuilder, NodeType};
//!
//! let graph = WorkflowBuilder::new()
//!     .add_node("intake", NodeType::ClaimIntake)
//!     .add_node("audit", NodeType::AuditLog)
//!     .connect("intake", "audit")
//!     .build();
//!
//! let mut engine = ExecutionEngine::new(Arc::new(registry));
//! let summary = engine.start_execution(graph, ExecutionSeed::new().claim("CLM-1")).await?;
//! ```

pub mod audit;
pub mod builder;
pub mod checkpoint;
pub mod condition;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod events;
pub mod node_config;
pub mod registry;
pub mod store;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use audit::ExecutionLogEntry;
pub use builder::WorkflowBuilder;
pub use checkpoint::{
    Assignee, AssigneeType, CheckpointContext, CheckpointDecision, CheckpointManager, CheckpointStatus,
    HitlCheckpoint,
};
pub use condition::{Condition, ConditionLogic, ConditionOperator};
pub use config::EngineConfig;
pub use context::{ExecutionContext, ExecutionSeed};
pub use descriptor::NodeMetadata;
pub use engine::{ExecutionControl, ExecutionEngine, ExecutionSummary};
pub use error::{EngineError, Result};
pub use events::{ChannelEventSink, EventError, EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use node_config::NodeConfig;
pub use registry::{HandlerResult, NodeHandler, NodeRegistry};
pub use store::{StoreEventSink, WorkflowStore};
pub use types::{
    ExecutionStatus, NodeCategory, NodeData, NodeId, NodeStatus, NodeType, Position, WorkflowDefinition,
    WorkflowEdge, WorkflowGraph, WorkflowNode, WorkflowStatus,
};
pub use undo::UndoStack;
pub use validation::{validate, validate_graph, Finding, Severity, ValidationReport};
