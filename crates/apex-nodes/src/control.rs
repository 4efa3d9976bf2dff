//! Control-flow handlers: decision branch, parallel split, loop iterator

use apex_engine::condition::evaluate_all;
use apex_engine::{ExecutionContext, HandlerResult, NodeConfig, NodeHandler, Result, WorkflowNode};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::support::config_failure;

/// Evaluates its condition(s) and routes along `true` or `false`
///
/// A branch without any condition is met.
#[derive(Debug, Clone, Default)]
pub struct DecisionBranchHandler;

#[async_trait]
impl NodeHandler for DecisionBranchHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let met = match &node.data.config {
            NodeConfig::Decision(config) => {
                evaluate_all(&config.all_conditions(), config.logic.unwrap_or_default(), context)
            }
            _ => true,
        };
        log::debug!("Decision branch {}: condition met = {}", node.id, met);

        Ok(HandlerResult::ok(json!({ "conditionMet": met })).with_branch(met))
    }
}

/// Fans out to every outgoing path
///
/// No `nextPath` is set, so every successor runs (one after another).
#[derive(Debug, Clone, Default)]
pub struct ParallelSplitHandler;

impl ParallelSplitHandler {
    pub const DEFAULT_PATHS: [&'static str; 3] = ["a", "b", "c"];
}

#[async_trait]
impl NodeHandler for ParallelSplitHandler {
    async fn execute(&self, node: &WorkflowNode, _context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let paths: Vec<String> = match &node.data.config {
            NodeConfig::ParallelSplit(config) => config.paths.clone(),
            _ => None,
        }
        .filter(|paths| !paths.is_empty())
        .unwrap_or_else(|| Self::DEFAULT_PATHS.iter().map(|p| p.to_string()).collect());

        Ok(HandlerResult::ok(json!({ "splitPaths": paths })))
    }
}

/// Reports the size of a collection and enters the loop body when non-empty
///
/// The body (`true`) is entered once per run since each node executes at
/// most once; `total` tells downstream nodes how many items there are.
#[derive(Debug, Clone, Default)]
pub struct LoopIteratorHandler;

impl LoopIteratorHandler {
    pub const DEFAULT_ITERATIONS: u32 = 1;
}

#[async_trait]
impl NodeHandler for LoopIteratorHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let (collection_key, max_iterations) = match &node.data.config {
            NodeConfig::Loop(config) => (config.collection_key.as_deref(), config.max_iterations),
            _ => (None, None),
        };

        let total = match collection_key.and_then(|key| context.lookup(key)) {
            Some(Value::Array(items)) => {
                let len = items.len() as u64;
                max_iterations.map_or(len, |max| len.min(u64::from(max)))
            }
            Some(_) | None => u64::from(max_iterations.unwrap_or(Self::DEFAULT_ITERATIONS)),
        };
        let current = if total > 0 { 1 } else { 0 };
        log::debug!("Loop iterator {}: {} of {}", node.id, current, total);

        Ok(HandlerResult::ok(json!({ "iteration": current, "total": total })).with_branch(total > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_engine::{ExecutionSeed, NodeType};

    fn node(node_type: NodeType, config: Value) -> WorkflowNode {
        let mut node = WorkflowNode::new("c", node_type.clone(), "Control");
        node.data.config = NodeConfig::parse(&node_type, config);
        node
    }

    fn claim(amount: u64) -> ExecutionContext {
        ExecutionContext::seeded("e", &ExecutionSeed::new().var("claim", json!({ "amount": amount, "state": "CA" })))
    }

    #[tokio::test]
    async fn test_branch_on_amount() {
        let branch = node(
            NodeType::DecisionBranch,
            json!({ "conditionField": "claim.amount", "operator": "greaterThan", "compareValue": 1000 }),
        );
        let high = DecisionBranchHandler.execute(&branch, &claim(5000)).await.unwrap();
        assert_eq!(high.next_path.as_deref(), Some("true"));
        assert_eq!(high.output, json!({ "conditionMet": true }));

        let low = DecisionBranchHandler.execute(&branch, &claim(100)).await.unwrap();
        assert_eq!(low.next_path.as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn test_branch_condition_list_with_or() {
        let branch = node(
            NodeType::DecisionBranch,
            json!({
                "logic": "or",
                "conditions": [
                    { "field": "claim.amount", "operator": "greaterThan", "value": 10000 },
                    { "field": "claim.state", "operator": "equals", "value": "CA" }
                ]
            }),
        );
        let result = DecisionBranchHandler.execute(&branch, &claim(50)).await.unwrap();
        assert_eq!(result.next_path.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_branch_unknown_operator_is_met() {
        let branch = node(
            NodeType::DecisionBranch,
            json!({ "conditionField": "claim.amount", "operator": "between", "compareValue": 1 }),
        );
        let result = DecisionBranchHandler.execute(&branch, &claim(50)).await.unwrap();
        assert_eq!(result.next_path.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_split_paths() {
        let default = ParallelSplitHandler
            .execute(&node(NodeType::ParallelSplit, Value::Null), &claim(1))
            .await
            .unwrap();
        assert_eq!(default.output["splitPaths"], json!(["a", "b", "c"]));
        assert!(default.next_path.is_none());

        let custom = ParallelSplitHandler
            .execute(&node(NodeType::ParallelSplit, json!({ "paths": ["a", "b"] })), &claim(1))
            .await
            .unwrap();
        assert_eq!(custom.output["splitPaths"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_loop_over_collection() {
        let ctx = ExecutionContext::seeded("e", &ExecutionSeed::new().var("lines", json!([1, 2, 3, 4])));
        let capped = node(NodeType::LoopIterator, json!({ "collectionKey": "lines", "maxIterations": 3 }));
        let result = LoopIteratorHandler.execute(&capped, &ctx).await.unwrap();
        assert_eq!(result.output, json!({ "iteration": 1, "total": 3 }));
        assert_eq!(result.next_path.as_deref(), Some("true"));

        let empty = ExecutionContext::seeded("e", &ExecutionSeed::new().var("lines", json!([])));
        let over_empty = node(NodeType::LoopIterator, json!({ "collectionKey": "lines" }));
        let result = LoopIteratorHandler.execute(&over_empty, &empty).await.unwrap();
        assert_eq!(result.output["total"], 0);
        assert_eq!(result.next_path.as_deref(), Some("false"));
    }
}
