//! Claim evaluation
//!
//! Decisions behind the eligibility, policy, fraud and clinical nodes.
//! [`RuleEvaluator`] decides from the execution context alone;
//! [`DelegateEvaluator`] hands fraud and clinical questions to the AI
//! delegate and keeps the rules for the rest.

use std::sync::Arc;

use apex_engine::node_config::EvaluationConfig;
use apex_engine::{ExecutionContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delegate::{self, AiDelegate, AnomalyDetection, AnomalyPattern};
use crate::support::{claim_payload, lookup_bool, lookup_number};

const DEFAULT_POLICY_LIMIT: f64 = 10_000.0;
const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.8;

const AMOUNT_FIELDS: &[&str] = &["chargedAmount", "claim.amount", "claim.chargedAmount", "extractedFields.chargedAmount"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityDecision {
    pub eligible: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub passed: bool,
    pub applied_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NecessityDecision {
    pub medically_necessary: bool,
    pub reasoning: String,
    /// Certainty reported by the decision source, when it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Decision source for the evaluation node family
#[async_trait]
pub trait ClaimEvaluator: Send + Sync {
    async fn check_eligibility(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<EligibilityDecision>;

    async fn apply_policy(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<PolicyDecision>;

    async fn detect_fraud(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<AnomalyDetection>;

    async fn assess_necessity(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<NecessityDecision>;
}

/// Deterministic rules over context variables
///
/// - eligibility: a member is on the claim and `coverageActive` is not false
/// - policy: the charged amount is within `threshold` (default 10 000)
/// - fraud: `anomalyScore` exceeds `threshold` (default 0.8)
/// - clinical: `medicallyNecessary`, defaulting to true
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator;

#[async_trait]
impl ClaimEvaluator for RuleEvaluator {
    async fn check_eligibility(&self, _config: &EvaluationConfig, context: &ExecutionContext) -> Result<EligibilityDecision> {
        let has_member = context.member_id().is_some_and(|m| !m.trim().is_empty());
        let (eligible, reason) = if !has_member {
            (false, "No member on claim")
        } else if lookup_bool(context, &["coverageActive", "member.coverageActive"]) == Some(false) {
            (false, "Coverage terminated")
        } else {
            (true, "Active coverage")
        };
        Ok(EligibilityDecision {
            eligible,
            reason: reason.to_string(),
        })
    }

    async fn apply_policy(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<PolicyDecision> {
        let limit = config.threshold.unwrap_or(DEFAULT_POLICY_LIMIT);
        let passed = match lookup_number(context, AMOUNT_FIELDS) {
            Some(amount) => amount <= limit,
            None => true,
        };
        let applied_rules = match &config.rule_set {
            Some(rules) => rules
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec!["Rule-101".to_string(), "Rule-203".to_string()],
        };
        Ok(PolicyDecision { passed, applied_rules })
    }

    async fn detect_fraud(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<AnomalyDetection> {
        let threshold = config.threshold.unwrap_or(DEFAULT_ANOMALY_THRESHOLD);
        let score = lookup_number(context, &["anomalyScore", "claim.anomalyScore"]).unwrap_or(0.0);
        let is_anomaly = score > threshold;
        let patterns = if is_anomaly {
            vec![AnomalyPattern {
                pattern_type: "frequency".to_string(),
                description: "Unusual billing frequency".to_string(),
                severity: "high".to_string(),
            }]
        } else {
            Vec::new()
        };
        Ok(AnomalyDetection {
            is_anomaly,
            score,
            patterns,
            recommendation: None,
        })
    }

    async fn assess_necessity(&self, _config: &EvaluationConfig, context: &ExecutionContext) -> Result<NecessityDecision> {
        let necessary = lookup_bool(context, &["medicallyNecessary", "claim.medicallyNecessary"]).unwrap_or(true);
        let reasoning = if necessary {
            "Procedure aligns with diagnosis and treatment guidelines"
        } else {
            "Alternative treatments not exhausted"
        };
        Ok(NecessityDecision {
            medically_necessary: necessary,
            reasoning: reasoning.to_string(),
            confidence: None,
        })
    }
}

/// Rules for eligibility and policy; the AI delegate for fraud and necessity
pub struct DelegateEvaluator {
    delegate: Arc<dyn AiDelegate>,
    rules: RuleEvaluator,
}

impl DelegateEvaluator {
    pub fn new(delegate: Arc<dyn AiDelegate>) -> Self {
        Self {
            delegate,
            rules: RuleEvaluator,
        }
    }
}

#[async_trait]
impl ClaimEvaluator for DelegateEvaluator {
    async fn check_eligibility(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<EligibilityDecision> {
        self.rules.check_eligibility(config, context).await
    }

    async fn apply_policy(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<PolicyDecision> {
        self.rules.apply_policy(config, context).await
    }

    async fn detect_fraud(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<AnomalyDetection> {
        let benchmarks = config.guidelines.as_deref().unwrap_or("Regional billing norms for the procedure");
        let mut detection = delegate::detect_anomaly(self.delegate.as_ref(), &claim_payload(context), benchmarks).await?;
        // A configured threshold overrides the model's own verdict
        if let Some(threshold) = config.threshold {
            detection.is_anomaly = detection.score > threshold;
        }
        Ok(detection)
    }

    async fn assess_necessity(&self, config: &EvaluationConfig, context: &ExecutionContext) -> Result<NecessityDecision> {
        let guidelines = config.guidelines.as_deref().unwrap_or("Standard clinical guidelines");
        let recommendation =
            delegate::evaluate_necessity(self.delegate.as_ref(), &claim_payload(context), guidelines).await?;
        Ok(NecessityDecision {
            medically_necessary: recommendation.is_approval(),
            reasoning: recommendation.reasoning,
            confidence: Some(recommendation.confidence),
        })
    }
}

/// Value of an evaluation decision as node output
pub(crate) fn to_output<T: Serialize>(decision: &T) -> Value {
    serde_json::to_value(decision).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::tests::CannedDelegate;
    use crate::delegate::AiOperation;
    use apex_engine::{EngineError, ExecutionSeed};
    use serde_json::json;

    fn context(seed: ExecutionSeed) -> ExecutionContext {
        ExecutionContext::seeded("exec-test", &seed)
    }

    #[tokio::test]
    async fn test_eligibility_rules() {
        let config = EvaluationConfig::default();
        let no_member = RuleEvaluator.check_eligibility(&config, &context(ExecutionSeed::new())).await.unwrap();
        assert!(!no_member.eligible);

        let lapsed = context(ExecutionSeed::new().member("M-1").var("coverageActive", json!(false)));
        let decision = RuleEvaluator.check_eligibility(&config, &lapsed).await.unwrap();
        assert_eq!(decision.reason, "Coverage terminated");

        let active = context(ExecutionSeed::new().member("M-1"));
        assert!(RuleEvaluator.check_eligibility(&config, &active).await.unwrap().eligible);
    }

    #[tokio::test]
    async fn test_policy_threshold() {
        let ctx = context(ExecutionSeed::new().var("claim", json!({ "amount": 12_500 })));
        let default_limit = RuleEvaluator.apply_policy(&EvaluationConfig::default(), &ctx).await.unwrap();
        assert!(!default_limit.passed);
        assert_eq!(default_limit.applied_rules, vec!["Rule-101", "Rule-203"]);

        let config = EvaluationConfig {
            threshold: Some(20_000.0),
            rule_set: Some("PLAN-A, PLAN-B".into()),
            ..Default::default()
        };
        let raised = RuleEvaluator.apply_policy(&config, &ctx).await.unwrap();
        assert!(raised.passed);
        assert_eq!(raised.applied_rules, vec!["PLAN-A", "PLAN-B"]);
    }

    #[tokio::test]
    async fn test_fraud_score_threshold() {
        let ctx = context(ExecutionSeed::new().var("anomalyScore", json!(0.93)));
        let detection = RuleEvaluator.detect_fraud(&EvaluationConfig::default(), &ctx).await.unwrap();
        assert!(detection.is_anomaly);
        assert_eq!(detection.patterns[0].description, "Unusual billing frequency");

        let clean = RuleEvaluator
            .detect_fraud(&EvaluationConfig::default(), &context(ExecutionSeed::new()))
            .await
            .unwrap();
        assert!(!clean.is_anomaly);
        assert!(clean.patterns.is_empty());
    }

    #[tokio::test]
    async fn test_delegate_evaluator_uses_model_verdict() {
        let delegate = CannedDelegate::default()
            .answer(
                AiOperation::EvaluateNecessity,
                r#"{"decision": "deny", "confidence": 0.7, "reasoning": "Conservative care not attempted"}"#,
            )
            .answer(AiOperation::DetectAnomaly, r#"{"isAnomaly": false, "score": 0.65, "patterns": []}"#);
        let evaluator = DelegateEvaluator::new(Arc::new(delegate));
        let ctx = context(ExecutionSeed::new().member("M-1"));

        let necessity = evaluator.assess_necessity(&EvaluationConfig::default(), &ctx).await.unwrap();
        assert!(!necessity.medically_necessary);
        assert_eq!(necessity.confidence, Some(0.7));

        let strict = EvaluationConfig {
            threshold: Some(0.5),
            ..Default::default()
        };
        assert!(evaluator.detect_fraud(&strict, &ctx).await.unwrap().is_anomaly);

        // Eligibility never reaches the delegate
        assert!(evaluator.check_eligibility(&strict, &ctx).await.unwrap().eligible);
    }

    #[tokio::test]
    async fn test_delegate_failure_surfaces_as_engine_error() {
        let evaluator = DelegateEvaluator::new(Arc::new(CannedDelegate::default()));
        let result = evaluator
            .assess_necessity(&EvaluationConfig::default(), &context(ExecutionSeed::new()))
            .await;
        assert!(matches!(result, Err(EngineError::Delegate(_))));
    }
}
