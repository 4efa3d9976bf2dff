//! Error types for the workflow engine

use thiserror::Error;

use crate::types::ExecutionStatus;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the workflow engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph has no node without an incoming edge
    #[error("Workflow has no trigger nodes")]
    NoTriggerNodes,

    /// A node id did not resolve
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// An edge id did not resolve
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// A checkpoint id did not resolve
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// The checkpoint already received its decision
    #[error("Checkpoint '{0}' has already been resolved")]
    CheckpointAlreadyResolved(String),

    /// The checkpoint's node demands a reason with every decision
    #[error("Checkpoint '{0}' requires a reason")]
    ReasonRequired(String),

    /// Requested status change is not part of the execution state machine
    #[error("Invalid execution transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// A run is already in progress
    #[error("Execution already active ({0:?})")]
    ExecutionActive(ExecutionStatus),

    /// The store has no workflow loaded
    #[error("No workflow loaded")]
    NoWorkflow,

    /// Archived workflows are read-only
    #[error("Workflow '{0}' is archived and cannot be modified")]
    WorkflowArchived(String),

    /// Publishing requires a structurally valid graph
    #[error("Workflow cannot be published: {0}")]
    PublishRejected(String),

    /// Node handler failed
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    /// AI delegate failure (transport, status, malformed response)
    #[error("Delegate error: {0}")]
    Delegate(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a handler failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::HandlerFailed(msg.into())
    }

    /// Create a delegate error with a message
    pub fn delegate(msg: impl Into<String>) -> Self {
        Self::Delegate(msg.into())
    }
}
