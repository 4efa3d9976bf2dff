//! Node handler registry
//!
//! Maps node types to the handler that executes them. The engine
//! dispatches through this registry instead of a hardcoded match, so
//! hosts can swap any handler (for mocks, or for real integrations).
//!
//! # Usage
//!
//! ```ignore
//! use apex_engine::{NodeRegistry, NodeType, HandlerResult};
//!
//! let mut registry = NodeRegistry::new();
//! registry.register(NodeType::EligibilityCheck, Arc::new(MyEligibilityHandler));
//! registry.register_sync(NodeType::AuditLog, |_node, _ctx| {
//!     Ok(HandlerResult::ok(serde_json::json!({ "logged": true })))
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::descriptor::{self, NodeMetadata};
use crate::error::Result;
use crate::types::{NodeType, WorkflowNode};

/// Outcome of one node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResult {
    pub success: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Branch label selecting matching outgoing edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_path: Option<String>,
    /// Suspend this branch for human review
    #[serde(default)]
    pub hitl_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandlerResult {
    /// Successful result with an output payload
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            confidence_score: None,
            next_path: None,
            hitl_required: false,
            error: None,
        }
    }

    /// Failed result; the branch ends at this node
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            confidence_score: None,
            next_path: None,
            hitl_required: false,
            error: Some(error.into()),
        }
    }

    /// Attach a confidence score, clamped to `[0, 1]`; non-finite scores are dropped
    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence_score = score.is_finite().then(|| score.clamp(0.0, 1.0));
        self
    }

    pub fn with_next_path(mut self, path: impl Into<String>) -> Self {
        self.next_path = Some(path.into());
        self
    }

    /// Route along the `"true"` or `"false"` handle
    pub fn with_branch(self, taken: bool) -> Self {
        self.with_next_path(if taken { "true" } else { "false" })
    }

    pub fn requiring_review(mut self) -> Self {
        self.hitl_required = true;
        self
    }
}

/// Per-node-type handler
///
/// Handlers report business failures through [`HandlerResult::failure`];
/// an `Err` is also caught by the engine and fails only this node.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult>;
}

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerResult>> + Send>>;

/// Async callback-based handler
///
/// Wraps an async closure; the closure receives owned copies of the
/// node and the context.
pub struct CallbackHandler {
    callback: Box<dyn Fn(WorkflowNode, ExecutionContext) -> BoxedHandlerFuture + Send + Sync>,
}

#[async_trait]
impl NodeHandler for CallbackHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        (self.callback)(node.clone(), context.clone()).await
    }
}

/// Synchronous callback-based handler
pub struct SyncCallbackHandler {
    callback: Box<dyn Fn(&WorkflowNode, &ExecutionContext) -> Result<HandlerResult> + Send + Sync>,
}

impl SyncCallbackHandler {
    pub fn new(
        callback: impl Fn(&WorkflowNode, &ExecutionContext) -> Result<HandlerResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl NodeHandler for SyncCallbackHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        (self.callback)(node, context)
    }
}

/// Registry of node handlers keyed by node type
///
/// # Composability
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = apex_nodes::builtin_registry(services);
/// registry.merge(overrides); // replace selected handlers
/// ```
pub struct NodeRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a node type, replacing any previous one
    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type, handler);
    }

    /// Register a node type using an async callback function
    pub fn register_fn<F, Fut>(&mut self, node_type: NodeType, callback: F)
    where
        F: Fn(WorkflowNode, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerResult>> + Send + 'static,
    {
        let handler = CallbackHandler {
            callback: Box::new(move |node, context| Box::pin(callback(node, context))),
        };
        self.register(node_type, Arc::new(handler));
    }

    /// Register a node type using a synchronous callback function
    pub fn register_sync<F>(&mut self, node_type: NodeType, callback: F)
    where
        F: Fn(&WorkflowNode, &ExecutionContext) -> Result<HandlerResult> + Send + Sync + 'static,
    {
        self.register(node_type, Arc::new(SyncCallbackHandler::new(callback)));
    }

    /// Get the handler for a node type
    pub fn get_handler(&self, node_type: &NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    /// Check if a node type has a handler
    pub fn has_handler(&self, node_type: &NodeType) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Catalog metadata for a node type
    pub fn metadata(&self, node_type: &NodeType) -> Option<&'static NodeMetadata> {
        descriptor::lookup(node_type)
    }

    /// List all node types with a handler
    pub fn node_types(&self) -> Vec<&NodeType> {
        let mut types: Vec<&NodeType> = self.handlers.keys().collect();
        types.sort();
        types
    }

    /// Catalogued node types lacking a handler
    pub fn missing_handlers(&self) -> Vec<NodeType> {
        NodeType::ALL
            .iter()
            .filter(|t| !self.handlers.contains_key(*t))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Handlers from `other` override handlers in `self` for the same type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.handlers.extend(other.handlers);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(node_type: NodeType) -> WorkflowNode {
        WorkflowNode::new("n1", node_type, "Node")
    }

    #[tokio::test]
    async fn test_register_sync() {
        let mut registry = NodeRegistry::new();
        registry.register_sync(NodeType::AuditLog, |node, _ctx| {
            Ok(HandlerResult::ok(json!({ "logged": node.id })))
        });

        assert!(registry.has_handler(&NodeType::AuditLog));
        assert!(!registry.has_handler(&NodeType::Webhook));

        let handler = registry.get_handler(&NodeType::AuditLog).unwrap();
        let result = handler
            .execute(&node(NodeType::AuditLog), &ExecutionContext::new("e"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, json!({ "logged": "n1" }));
    }

    #[tokio::test]
    async fn test_register_fn_sees_context() {
        let mut registry = NodeRegistry::new();
        registry.register_fn(NodeType::EligibilityCheck, |_node, ctx| async move {
            let eligible = ctx.member_id().is_some();
            Ok(HandlerResult::ok(json!({ "eligible": eligible }))
                .with_branch(eligible)
                .with_confidence(1.5))
        });

        let mut ctx = ExecutionContext::new("e");
        ctx.set("memberId", json!("M-1"));
        let handler = registry.get_handler(&NodeType::EligibilityCheck).unwrap();
        let result = handler.execute(&node(NodeType::EligibilityCheck), &ctx).await.unwrap();
        assert_eq!(result.next_path.as_deref(), Some("true"));
        // Confidence is clamped to [0, 1]
        assert_eq!(result.confidence_score, Some(1.0));
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = NodeRegistry::new();
        base.register_sync(NodeType::Webhook, |_, _| Ok(HandlerResult::ok(json!("base"))));
        base.register_sync(NodeType::AuditLog, |_, _| Ok(HandlerResult::ok(json!("base"))));

        let mut overrides = NodeRegistry::new();
        overrides.register_sync(NodeType::Webhook, |_, _| Ok(HandlerResult::failure("mock")));

        base.merge(overrides);
        assert_eq!(base.len(), 2);
        assert_eq!(base.missing_handlers().len(), NodeType::ALL.len() - 2);
    }

    #[test]
    fn test_handler_result_builders() {
        let result = HandlerResult::ok(json!({})).requiring_review();
        assert!(result.success && result.hitl_required);

        let failed = HandlerResult::failure("service unavailable");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("service unavailable"));
    }

    #[test]
    fn test_non_finite_confidence_dropped() {
        assert_eq!(HandlerResult::ok(json!({})).with_confidence(f64::NAN).confidence_score, None);
        assert_eq!(HandlerResult::ok(json!({})).with_confidence(f64::INFINITY).confidence_score, None);
        assert_eq!(HandlerResult::ok(json!({})).with_confidence(-0.2).confidence_score, Some(0.0));
    }
}
