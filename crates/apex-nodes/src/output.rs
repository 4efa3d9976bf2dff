//! Output handlers
//!
//! Terminal nodes producing the final payload of a branch: the claim
//! decision, member/provider notification, the API response and the
//! audit record. None of them set a `nextPath`.

use apex_engine::node_config::{ApiResponseConfig, AuditLogConfig, DecisionOutputConfig, NotificationConfig};
use apex_engine::{ExecutionContext, HandlerResult, NodeConfig, NodeHandler, Result, WorkflowNode};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::support::{config_failure, timestamp};

#[derive(Debug, Clone, Default)]
pub struct DecisionOutputHandler;

impl DecisionOutputHandler {
    pub const DEFAULT_DECISION: &'static str = "approve";
    pub const DEFAULT_REASON_CODE: &'static str = "A1";
}

#[async_trait]
impl NodeHandler for DecisionOutputHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let config = match &node.data.config {
            NodeConfig::DecisionOutput(c) => c.clone(),
            _ => DecisionOutputConfig::default(),
        };
        let decision = config.decision_type.unwrap_or_else(|| Self::DEFAULT_DECISION.to_string());
        log::info!("Claim {:?} decided: {}", context.claim_id(), decision);

        Ok(HandlerResult::ok(json!({
            "decision": decision,
            "reasonCode": config.reason_code.unwrap_or_else(|| Self::DEFAULT_REASON_CODE.to_string()),
            "claimId": context.claim_id(),
            "timestamp": timestamp(),
        })))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationHandler;

impl NotificationHandler {
    pub const DEFAULT_CHANNELS: [&'static str; 2] = ["email", "portal"];
}

#[async_trait]
impl NodeHandler for NotificationHandler {
    async fn execute(&self, node: &WorkflowNode, _context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let config = match &node.data.config {
            NodeConfig::Notification(c) => c.clone(),
            _ => NotificationConfig::default(),
        };
        let channels = config
            .channels
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect());
        log::debug!("Notification {} via {:?}", node.id, channels);

        Ok(HandlerResult::ok(json!({
            "notificationSent": true,
            "channels": channels,
            "recipients": config.recipients.unwrap_or_default(),
        })))
    }
}

/// Wraps the previous node's output as the response payload
#[derive(Debug, Clone, Default)]
pub struct ApiResponseHandler;

impl ApiResponseHandler {
    pub const DEFAULT_STATUS: u16 = 200;
}

#[async_trait]
impl NodeHandler for ApiResponseHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let config = match &node.data.config {
            NodeConfig::ApiResponse(c) => c.clone(),
            _ => ApiResponseConfig::default(),
        };

        let mut output = json!({
            "responseCode": config.status_code.unwrap_or(Self::DEFAULT_STATUS),
            "payload": context.last_output().cloned().unwrap_or(Value::Null),
        });
        if let Some(url) = config.callback_url {
            output["callbackUrl"] = Value::String(url);
        }
        Ok(HandlerResult::ok(output))
    }
}

/// Records that the run reached the audit point
///
/// `entries` counts this node along with every output recorded before it.
#[derive(Debug, Clone, Default)]
pub struct AuditLogHandler;

#[async_trait]
impl NodeHandler for AuditLogHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let category = match &node.data.config {
            NodeConfig::AuditLog(AuditLogConfig { category: Some(c), .. }) => c.clone(),
            _ => "claims".to_string(),
        };

        Ok(HandlerResult::ok(json!({
            "logged": true,
            "category": category,
            "entries": context.recorded_outputs() + 1,
        })))
    }
}
