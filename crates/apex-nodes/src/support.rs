//! Helpers shared by the built-in handlers

use apex_engine::node_config::EvaluationConfig;
use apex_engine::{ExecutionContext, HandlerResult, NodeConfig, WorkflowNode};
use serde_json::Value;

/// Failure for a node whose config did not parse for its type
pub(crate) fn config_failure(node: &WorkflowNode) -> Option<HandlerResult> {
    node.data.config.parse_error().map(|error| {
        HandlerResult::failure(format!(
            "Invalid configuration for '{}': {}",
            node.data.label, error
        ))
    })
}

/// Evaluation settings of a node, defaulted when absent
pub(crate) fn evaluation_config(node: &WorkflowNode) -> EvaluationConfig {
    match &node.data.config {
        NodeConfig::Evaluation(config) => config.clone(),
        _ => EvaluationConfig::default(),
    }
}

/// The claim as seen by model calls: the `claim` variable, or every variable
pub(crate) fn claim_payload(context: &ExecutionContext) -> Value {
    match context.get("claim") {
        Some(claim) if !claim.is_null() => claim.clone(),
        _ => context.snapshot(),
    }
}

/// First field that resolves to a non-null value
pub(crate) fn lookup_first<'a>(context: &'a ExecutionContext, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|field| context.lookup(field))
        .find(|value| !value.is_null())
}

pub(crate) fn lookup_str(context: &ExecutionContext, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match context.lookup(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Numbers, or strings holding one
pub(crate) fn lookup_number(context: &ExecutionContext, fields: &[&str]) -> Option<f64> {
    fields.iter().find_map(|field| match context.lookup(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Booleans, or the strings "true"/"false"
pub(crate) fn lookup_bool(context: &ExecutionContext, fields: &[&str]) -> Option<bool> {
    fields.iter().find_map(|field| match context.lookup(field)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
