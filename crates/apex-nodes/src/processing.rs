//! Processing handlers: eligibility, policy and medical coding

use std::sync::Arc;

use apex_engine::{EngineError, ExecutionContext, HandlerResult, NodeConfig, NodeHandler, Result, WorkflowNode};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::evaluator::{to_output, ClaimEvaluator};
use crate::support::{config_failure, evaluation_config, lookup_first, lookup_str};

/// Checks member coverage; routes `true` when eligible
pub struct EligibilityHandler {
    evaluator: Arc<dyn ClaimEvaluator>,
}

impl EligibilityHandler {
    pub const CONFIDENCE: f64 = 0.99;

    pub fn new(evaluator: Arc<dyn ClaimEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeHandler for EligibilityHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let decision = match self.evaluator.check_eligibility(&evaluation_config(node), context).await {
            Ok(decision) => decision,
            Err(e) => return Ok(HandlerResult::failure(e.to_string())),
        };
        log::debug!("Eligibility {}: eligible={} ({})", node.id, decision.eligible, decision.reason);

        Ok(HandlerResult::ok(to_output(&decision))
            .with_confidence(Self::CONFIDENCE)
            .with_branch(decision.eligible))
    }
}

/// Applies plan rules; routes `true` when the claim passes
pub struct PolicyHandler {
    evaluator: Arc<dyn ClaimEvaluator>,
}

impl PolicyHandler {
    pub const CONFIDENCE: f64 = 0.95;

    pub fn new(evaluator: Arc<dyn ClaimEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeHandler for PolicyHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let decision = match self.evaluator.apply_policy(&evaluation_config(node), context).await {
            Ok(decision) => decision,
            Err(e) => return Ok(HandlerResult::failure(e.to_string())),
        };
        log::debug!(
            "Policy {}: passed={} rules={:?}",
            node.id,
            decision.passed,
            decision.applied_rules
        );

        Ok(HandlerResult::ok(to_output(&decision))
            .with_confidence(Self::CONFIDENCE)
            .with_branch(decision.passed))
    }
}

/// Validates CPT and ICD-10 codes found on the claim
///
/// Codes are read from the claim, the top-level context or fields a
/// document analyzer extracted earlier. `validCodes` is true when at
/// least one code was found and every code checked is well-formed.
#[derive(Debug, Clone, Default)]
pub struct MedicalCodingHandler;

impl MedicalCodingHandler {
    pub const CONFIDENCE: f64 = 0.97;

    const CPT_FIELDS: &'static [&'static str] = &[
        "cptCode",
        "procedureCode",
        "claim.cptCode",
        "claim.cpt",
        "claim.procedureCode",
        "extractedFields.procedureCode",
    ];
    const ICD10_FIELDS: &'static [&'static str] = &[
        "icd10Code",
        "diagnosisCode",
        "claim.icd10Code",
        "claim.icd10",
        "claim.diagnosisCode",
        "extractedFields.diagnosisCode",
    ];
    const MODIFIER_FIELDS: &'static [&'static str] = &["modifiers", "claim.modifiers"];

    const CPT_PATTERN: &'static str = r"^\d{4}[0-9A-Z]$";
    const ICD10_PATTERN: &'static str = r"^[A-TV-Z][0-9][0-9A-Z](\.[0-9A-Z]{1,4})?$";

    fn checks(system: &str, config: &NodeConfig) -> bool {
        match config {
            NodeConfig::MedicalCoding(c) => match &c.code_systems {
                Some(systems) => systems.iter().any(|s| s.eq_ignore_ascii_case(system)),
                None => true,
            },
            _ => true,
        }
    }
}

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| EngineError::failed(format!("invalid code pattern: {}", e)))
}

#[async_trait]
impl NodeHandler for MedicalCodingHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }

        let cpt = lookup_str(context, Self::CPT_FIELDS).map(|c| c.to_uppercase());
        let icd10 = lookup_str(context, Self::ICD10_FIELDS).map(|c| c.to_uppercase());

        let mut checked = Vec::new();
        if Self::checks("cpt", &node.data.config) {
            if let Some(code) = &cpt {
                checked.push(pattern(Self::CPT_PATTERN)?.is_match(code));
            }
        }
        if Self::checks("icd10", &node.data.config) {
            if let Some(code) = &icd10 {
                checked.push(pattern(Self::ICD10_PATTERN)?.is_match(code));
            }
        }
        let valid = !checked.is_empty() && checked.iter().all(|ok| *ok);

        let modifiers = match lookup_first(context, Self::MODIFIER_FIELDS) {
            Some(Value::Array(items)) => Value::Array(items.clone()),
            Some(Value::String(s)) => json!(s.split(',').map(str::trim).filter(|m| !m.is_empty()).collect::<Vec<_>>()),
            _ => json!([]),
        };
        log::debug!("Medical coding {}: cpt={:?} icd10={:?} valid={}", node.id, cpt, icd10, valid);

        Ok(HandlerResult::ok(json!({
            "validCodes": valid,
            "cptCode": cpt,
            "icd10Code": icd10,
            "modifiers": modifiers,
        }))
        .with_confidence(Self::CONFIDENCE))
    }
}
