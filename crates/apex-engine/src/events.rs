//! Event types for streaming execution progress
//!
//! Events are sent from the engine to its host (a UI store, the CLI,
//! a test harness) for every state transition. The host owns
//! persistence of what it receives.

use serde::{Deserialize, Serialize};

use crate::audit::ExecutionLogEntry;
use crate::checkpoint::HitlCheckpoint;
use crate::types::{ExecutionStatus, NodeId, NodeStatus};

/// Trait for sending workflow events
///
/// This abstracts over the transport mechanism (mpsc channel, store
/// adapter, etc.) allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Partial node data accompanying a status change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Events emitted during workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// A run started; node statuses were reset
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        execution_id: String,
        trigger_count: usize,
    },

    /// Run-level status changed
    #[serde(rename_all = "camelCase")]
    ExecutionStatusChanged {
        execution_id: String,
        status: ExecutionStatus,
    },

    /// A node changed status
    #[serde(rename_all = "camelCase")]
    NodeStatusChanged {
        node_id: NodeId,
        status: NodeStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<NodeStatusData>,
    },

    /// An audit entry was produced
    #[serde(rename_all = "camelCase")]
    LogAppended { entry: ExecutionLogEntry },

    /// A branch suspended for human review
    #[serde(rename_all = "camelCase")]
    CheckpointCreated { checkpoint: HitlCheckpoint },

    /// A reviewer decided a checkpoint
    #[serde(rename_all = "camelCase")]
    CheckpointResolved { checkpoint: HitlCheckpoint },

    /// A checkpoint passed its escalation time
    #[serde(rename_all = "camelCase")]
    CheckpointEscalated { checkpoint: HitlCheckpoint },

    /// Edge animation toggled (presentation hint)
    #[serde(rename_all = "camelCase")]
    EdgesAnimated { animated: bool },
}

impl WorkflowEvent {
    /// Create a node status event without extra data
    pub fn node_status(node_id: &str, status: NodeStatus) -> Self {
        Self::NodeStatusChanged {
            node_id: node_id.to_string(),
            status,
            data: None,
        }
    }

    /// Create a node status event carrying confidence and/or error
    pub fn node_status_with(
        node_id: &str,
        status: NodeStatus,
        confidence_score: Option<f64>,
        error: Option<String>,
    ) -> Self {
        let data = if confidence_score.is_none() && error.is_none() {
            None
        } else {
            Some(NodeStatusData {
                confidence_score,
                error,
            })
        };
        Self::NodeStatusChanged {
            node_id: node_id.to_string(),
            status,
            data,
        }
    }

    pub fn execution_status(execution_id: &str, status: ExecutionStatus) -> Self {
        Self::ExecutionStatusChanged {
            execution_id: execution_id.to_string(),
            status,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Statuses reported for one node, in order
    pub fn node_statuses(&self, node_id: &str) -> Vec<NodeStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::NodeStatusChanged {
                    node_id: id, status, ..
                } if id == node_id => Some(*status),
                _ => None,
            })
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events over an unbounded tokio channel
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, tokio::sync::mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::channel_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(WorkflowEvent::node_status("n1", NodeStatus::Running)).unwrap();
        sink.send(WorkflowEvent::node_status_with("n1", NodeStatus::Completed, Some(0.9), None))
            .unwrap();
        sink.send(WorkflowEvent::node_status("n2", NodeStatus::Running)).unwrap();

        assert_eq!(sink.events().len(), 3);
        assert_eq!(
            sink.node_statuses("n1"),
            vec![NodeStatus::Running, NodeStatus::Completed]
        );

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_null_event_sink() {
        let sink = NullEventSink;
        // Should not panic
        sink.send(WorkflowEvent::EdgesAnimated { animated: true }).unwrap();
    }

    #[tokio::test]
    async fn test_channel_event_sink() {
        let (sink, mut receiver) = ChannelEventSink::channel();
        sink.send(WorkflowEvent::execution_status("exec-1", ExecutionStatus::Running))
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(
            event,
            WorkflowEvent::ExecutionStatusChanged {
                execution_id: "exec-1".to_string(),
                status: ExecutionStatus::Running,
            }
        );

        drop(receiver);
        assert!(sink
            .send(WorkflowEvent::EdgesAnimated { animated: false })
            .is_err());
    }

    #[test]
    fn test_event_wire_tag() {
        let value = serde_json::to_value(WorkflowEvent::node_status("n1", NodeStatus::Paused)).unwrap();
        assert_eq!(value["type"], "nodeStatusChanged");
        assert_eq!(value["nodeId"], "n1");
        assert_eq!(value["status"], "paused");
    }
}
