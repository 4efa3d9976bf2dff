//! Audit trail entries
//!
//! One entry per node execution (and per checkpoint resolution).
//! Entries are append-only. The engine emits them without an id; the
//! host assigns one when it stores them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{NodeId, NodeStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub execution_id: String,
    pub node_id: NodeId,
    pub node_name: String,
    pub timestamp: DateTime<Utc>,
    /// Resulting node status
    pub status: NodeStatus,
    /// Context snapshot consumed by the node
    pub input: Value,
    /// Result payload produced by the node
    pub output: Value,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionLogEntry {
    pub fn is_error(&self) -> bool {
        self.status == NodeStatus::Error
    }

    /// Copy of this entry carrying a fresh id
    pub fn with_generated_id(mut self) -> Self {
        self.id = Some(uuid::Uuid::new_v4().to_string());
        self
    }
}
