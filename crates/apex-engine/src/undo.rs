//! Graph edit history
//!
//! Each recorded state is the JSON form of the graph compressed with
//! zstd. The cursor points at the state currently shown; recording a
//! new state drops everything after the cursor.

use std::collections::VecDeque;

use crate::error::{EngineError, Result};
use crate::types::WorkflowGraph;

const COMPRESSION_LEVEL: i32 = 3;

/// Bounded undo/redo history of graph states
pub struct UndoStack {
    snapshots: VecDeque<Vec<u8>>,
    cursor: usize,
    limit: usize,
}

impl UndoStack {
    /// Keep at most `limit` states (minimum one)
    pub fn new(limit: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Record `graph` as the newest state, discarding redo history
    pub fn record(&mut self, graph: &WorkflowGraph) -> Result<()> {
        let compressed = compress(graph)?;

        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push_back(compressed);
        self.cursor = self.snapshots.len() - 1;

        while self.snapshots.len() > self.limit {
            self.snapshots.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
        Ok(())
    }

    /// Step back; None when already at the oldest state
    pub fn undo(&mut self) -> Option<Result<WorkflowGraph>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.restore(self.cursor))
    }

    /// Step forward; None when already at the newest state
    pub fn redo(&mut self) -> Option<Result<WorkflowGraph>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.restore(self.cursor))
    }

    pub fn current(&self) -> Option<Result<WorkflowGraph>> {
        (!self.snapshots.is_empty()).then(|| self.restore(self.cursor))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Forget all history; the next record becomes the baseline
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
    }

    /// Bytes held by all compressed states
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(Vec::len).sum()
    }

    fn restore(&self, index: usize) -> Result<WorkflowGraph> {
        let json = zstd::decode_all(&self.snapshots[index][..])
            .map_err(|e| EngineError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}

fn compress(graph: &WorkflowGraph) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(graph)?;
    zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| EngineError::Compression(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::types::NodeType;

    fn graph_with(ids: &[&str]) -> WorkflowGraph {
        ids.iter()
            .fold(WorkflowBuilder::new(), |b, id| b.add_node(*id, NodeType::AuditLog))
            .build()
    }

    fn ids(graph: &WorkflowGraph) -> Vec<String> {
        graph.nodes.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_undo_redo_walk() {
        let mut history = UndoStack::new(10);
        history.record(&graph_with(&[])).unwrap();
        history.record(&graph_with(&["a"])).unwrap();
        history.record(&graph_with(&["a", "b"])).unwrap();

        assert_eq!(ids(&history.undo().unwrap().unwrap()), vec!["a"]);
        assert!(ids(&history.undo().unwrap().unwrap()).is_empty());
        assert!(history.undo().is_none());

        assert_eq!(ids(&history.redo().unwrap().unwrap()), vec!["a"]);
        assert_eq!(ids(&history.redo().unwrap().unwrap()), vec!["a", "b"]);
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_record_after_undo_drops_redo() {
        let mut history = UndoStack::new(10);
        history.record(&graph_with(&["a"])).unwrap();
        history.record(&graph_with(&["a", "b"])).unwrap();
        history.undo();

        history.record(&graph_with(&["a", "c"])).unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
        assert_eq!(ids(&history.current().unwrap().unwrap()), vec!["a", "c"]);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut history = UndoStack::new(3);
        for i in 0..5 {
            let id = format!("n{}", i);
            history.record(&graph_with(&[id.as_str()])).unwrap();
        }
        assert_eq!(history.len(), 3);

        history.undo();
        let oldest = history.undo().unwrap().unwrap();
        assert_eq!(ids(&oldest), vec!["n2"]);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_config_and_handles_survive_compression() {
        let graph = WorkflowBuilder::new()
            .add_node("intake", NodeType::ClaimIntake)
            .add_node("branch", NodeType::DecisionBranch)
            .with_config(serde_json::json!({ "conditionField": "amount", "operator": "lessThan", "compareValue": 10 }))
            .connect_handle("intake", "true", "branch")
            .build();

        let mut history = UndoStack::default();
        history.record(&graph).unwrap();
        assert!(history.compressed_size() > 0);
        assert_eq!(history.current().unwrap().unwrap(), graph);
    }
}
