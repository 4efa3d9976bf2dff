//! Trigger handlers
//!
//! Claim intake, prior authorization request, scheduled batch and
//! webhook all start a run the same way: they always succeed and stamp
//! the output with the trigger time and source.

use apex_engine::node_config::TriggerConfig;
use apex_engine::{ExecutionContext, HandlerResult, NodeConfig, NodeHandler, Result, WorkflowNode};
use async_trait::async_trait;
use serde_json::json;

use crate::support::timestamp;

#[derive(Debug, Clone, Default)]
pub struct TriggerHandler;

impl TriggerHandler {
    pub const DEFAULT_SOURCE: &'static str = "manual";
}

#[async_trait]
impl NodeHandler for TriggerHandler {
    async fn execute(&self, node: &WorkflowNode, _context: &ExecutionContext) -> Result<HandlerResult> {
        // A malformed trigger config still starts the run
        let source = match &node.data.config {
            NodeConfig::Trigger(TriggerConfig { source: Some(s), .. }) if !s.trim().is_empty() => s.clone(),
            _ => Self::DEFAULT_SOURCE.to_string(),
        };
        log::debug!("Trigger {} fired from '{}'", node.id, source);

        Ok(HandlerResult::ok(json!({
            "triggered": true,
            "timestamp": timestamp(),
            "source": source,
        })))
    }
}
