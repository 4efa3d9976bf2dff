//! Human review handlers
//!
//! Checkpoint, quality review and exception handler nodes share one
//! handler. It always succeeds and asks for review; the engine opens the
//! checkpoint and holds the branch until a reviewer decides.

use apex_engine::node_config::HitlConfig;
use apex_engine::{AssigneeType, ExecutionContext, HandlerResult, NodeConfig, NodeHandler, NodeType, Result, WorkflowNode};
use async_trait::async_trait;
use serde_json::json;

#[derive(Debug, Clone, Default)]
pub struct ReviewHandler;

impl ReviewHandler {
    pub const DEFAULT_SLA_HOURS: u32 = 24;

    fn review_kind(node_type: &NodeType) -> &'static str {
        match node_type {
            NodeType::QualityReview => "quality",
            NodeType::ExceptionHandler => "exception",
            _ => "checkpoint",
        }
    }
}

#[async_trait]
impl NodeHandler for ReviewHandler {
    async fn execute(&self, node: &WorkflowNode, _context: &ExecutionContext) -> Result<HandlerResult> {
        // Review is requested even when the config is unreadable
        let fallback = HitlConfig::default();
        let config = match &node.data.config {
            NodeConfig::Hitl(config) => config,
            _ => &fallback,
        };
        let assignee = config.assignee_type.unwrap_or(AssigneeType::Team);
        let sla = config.sla_hours.unwrap_or(Self::DEFAULT_SLA_HOURS);
        log::debug!("Review requested at {} ({:?}, {}h SLA)", node.id, assignee, sla);

        Ok(HandlerResult::ok(json!({
            "requiresHumanReview": true,
            "reviewType": Self::review_kind(&node.node_type),
            "assignee": assignee,
            "sla": sla,
        }))
        .requiring_review())
    }
}
