//! AI handlers
//!
//! Document analysis, the model-backed recommendation, fraud detection
//! and clinical reasoning. Model calls go through the [`AiDelegate`]
//! held in [`NodeServices`](crate::NodeServices); a delegate failure fails the node and its
//! branch halts there, with no retry.

use std::sync::Arc;

use apex_engine::condition::to_text;
use apex_engine::node_config::{AiAnalysisConfig, DocumentAnalysisConfig};
use apex_engine::{ExecutionContext, HandlerResult, NodeConfig, NodeHandler, Result, WorkflowNode};
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};

use crate::delegate::{self, AiDelegate};
use crate::evaluator::ClaimEvaluator;
use crate::support::{claim_payload, config_failure, evaluation_config, lookup_first};

const DEFAULT_DOCUMENT_KEY: &str = "document";
const DEFAULT_FIELDS: &[&str] = &["serviceDate", "procedureCode", "diagnosisCode", "chargedAmount"];
const DEFAULT_GUIDELINES: &str = "Standard clinical guidelines";

/// Extracts claim fields from a document
///
/// With a delegate and document content in the context, the model does
/// the extraction. Otherwise fields are read from the context itself
/// (top level, then under `claim`). Confidence is the share of fields
/// that came back non-null.
pub struct DocumentAnalyzerHandler {
    delegate: Option<Arc<dyn AiDelegate>>,
}

impl DocumentAnalyzerHandler {
    pub const DOCUMENT_TYPE: &'static str = "Medical Claim";

    pub fn new(delegate: Option<Arc<dyn AiDelegate>>) -> Self {
        Self { delegate }
    }

    fn from_context(context: &ExecutionContext, fields: &[String]) -> Map<String, Value> {
        fields
            .iter()
            .map(|field| {
                let nested = format!("claim.{}", field);
                let value = lookup_first(context, &[field.as_str(), nested.as_str()])
                    .cloned()
                    .unwrap_or(Value::Null);
                (field.clone(), value)
            })
            .collect()
    }
}

#[async_trait]
impl NodeHandler for DocumentAnalyzerHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let config = match &node.data.config {
            NodeConfig::DocumentAnalysis(c) => c.clone(),
            _ => DocumentAnalysisConfig::default(),
        };
        let fields: Vec<String> = match config.fields {
            Some(fields) if !fields.is_empty() => fields,
            _ => DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        };
        let document_key = config.document_key.as_deref().unwrap_or(DEFAULT_DOCUMENT_KEY);
        let content = context.lookup(document_key).filter(|v| !v.is_null()).map(to_text);

        let extracted = match (&self.delegate, content) {
            (Some(delegate), Some(content)) => {
                log::debug!("Document analyzer {}: delegating {} fields", node.id, fields.len());
                match delegate::analyze_document(delegate.as_ref(), &content, &fields).await {
                    Ok(extracted) => extracted,
                    Err(e) => return Ok(HandlerResult::failure(format!("Document analysis failed: {}", e))),
                }
            }
            _ => Self::from_context(context, &fields),
        };

        let found = fields
            .iter()
            .filter(|f| extracted.get(*f).is_some_and(|v| !v.is_null()))
            .count();
        let confidence = if fields.is_empty() {
            0.0
        } else {
            found as f64 / fields.len() as f64
        };

        Ok(HandlerResult::ok(json!({
            "documentType": Self::DOCUMENT_TYPE,
            "extractedFields": extracted,
            "confidence": confidence,
        }))
        .with_confidence(confidence))
    }
}

/// Model recommendation on medical necessity
pub struct GeminiAnalyzerHandler {
    delegate: Option<Arc<dyn AiDelegate>>,
}

impl GeminiAnalyzerHandler {
    pub fn new(delegate: Option<Arc<dyn AiDelegate>>) -> Self {
        Self { delegate }
    }
}

/// Fill `{{key}}` placeholders from the context; unknown keys render empty
pub fn render_prompt(template: &str, context: &ExecutionContext) -> String {
    let Ok(placeholder) = Regex::new(r"\{\{\s*([\w.]+)\s*\}\}") else {
        return template.to_string();
    };
    placeholder
        .replace_all(template, |caps: &Captures| {
            context.lookup(&caps[1]).map(to_text).unwrap_or_default()
        })
        .into_owned()
}

#[async_trait]
impl NodeHandler for GeminiAnalyzerHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let Some(delegate) = &self.delegate else {
            return Ok(HandlerResult::failure(format!(
                "AI analysis failed: {}",
                delegate::DelegateError::NotConfigured
            )));
        };
        let config = match &node.data.config {
            NodeConfig::AiAnalysis(c) => c.clone(),
            _ => AiAnalysisConfig::default(),
        };
        let guidelines = match (&config.prompt_template, &config.system_prompt) {
            (Some(template), _) => render_prompt(template, context),
            (None, Some(system)) => system.clone(),
            (None, None) => DEFAULT_GUIDELINES.to_string(),
        };

        let recommendation = match delegate::evaluate_necessity(delegate.as_ref(), &claim_payload(context), &guidelines).await {
            Ok(rec) => rec,
            Err(e) => {
                log::warn!("AI analysis failed for node {}: {}", node.id, e);
                return Ok(HandlerResult::failure(format!("AI analysis failed: {}", e)));
            }
        };
        log::debug!(
            "AI analysis {}: {} ({:.2})",
            node.id,
            recommendation.decision,
            recommendation.confidence
        );

        Ok(HandlerResult::ok(json!({
            "recommendation": recommendation.decision,
            "reasoning": recommendation.reasoning,
            "factors": recommendation.factors,
            "suggestedActions": recommendation.suggested_actions,
        }))
        .with_confidence(recommendation.confidence))
    }
}

/// Scores billing anomalies; routes `true` when the claim looks anomalous
pub struct FraudDetectorHandler {
    evaluator: Arc<dyn ClaimEvaluator>,
}

impl FraudDetectorHandler {
    pub const CONFIDENCE: f64 = 0.92;

    pub fn new(evaluator: Arc<dyn ClaimEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeHandler for FraudDetectorHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let detection = match self.evaluator.detect_fraud(&evaluation_config(node), context).await {
            Ok(detection) => detection,
            Err(e) => return Ok(HandlerResult::failure(e.to_string())),
        };
        if detection.is_anomaly {
            log::info!("Fraud detector {} flagged claim (score {:.2})", node.id, detection.score);
        }

        Ok(HandlerResult::ok(json!({
            "anomalyScore": detection.score,
            "isAnomaly": detection.is_anomaly,
            "patterns": detection.patterns,
        }))
        .with_confidence(Self::CONFIDENCE)
        .with_branch(detection.is_anomaly))
    }
}

/// Medical necessity; routes `true` when necessary
pub struct ClinicalReasonerHandler {
    evaluator: Arc<dyn ClaimEvaluator>,
}

impl ClinicalReasonerHandler {
    pub const DEFAULT_CONFIDENCE: f64 = 0.85;

    pub fn new(evaluator: Arc<dyn ClaimEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl NodeHandler for ClinicalReasonerHandler {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> Result<HandlerResult> {
        if let Some(failure) = config_failure(node) {
            return Ok(failure);
        }
        let decision = match self.evaluator.assess_necessity(&evaluation_config(node), context).await {
            Ok(decision) => decision,
            Err(e) => return Ok(HandlerResult::failure(e.to_string())),
        };
        let confidence = decision.confidence.unwrap_or(Self::DEFAULT_CONFIDENCE);

        Ok(HandlerResult::ok(json!({
            "medicallyNecessary": decision.medically_necessary,
            "reasoning": decision.reasoning,
        }))
        .with_confidence(confidence)
        .with_branch(decision.medically_necessary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::tests::CannedDelegate;
    use crate::delegate::AiOperation;
    use crate::evaluator::{DelegateEvaluator, RuleEvaluator};
    use apex_engine::{ExecutionSeed, NodeType};

    fn node(node_type: NodeType, config: Value) -> WorkflowNode {
        let mut node = WorkflowNode::new("ai", node_type.clone(), "AI");
        node.data.config = NodeConfig::parse(&node_type, config);
        node
    }

    #[tokio::test]
    async fn test_document_analyzer_reads_context_without_delegate() {
        let ctx = ExecutionContext::seeded(
            "e",
            &ExecutionSeed::new().var("claim", json!({ "serviceDate": "2024-01-15", "chargedAmount": 420 })),
        );
        let result = DocumentAnalyzerHandler::new(None)
            .execute(&node(NodeType::DocumentAnalyzer, Value::Null), &ctx)
            .await
            .unwrap();

        assert_eq!(result.output["documentType"], "Medical Claim");
        assert_eq!(result.output["extractedFields"]["chargedAmount"], 420);
        assert!(result.output["extractedFields"]["procedureCode"].is_null());
        assert_eq!(result.confidence_score, Some(0.5));
    }

    #[tokio::test]
    async fn test_document_analyzer_delegates_document() {
        let delegate = CannedDelegate::default().answer(
            AiOperation::AnalyzeDocument,
            r#"{"procedureCode": "99213", "diagnosisCode": "M54.5"}"#,
        );
        let ctx = ExecutionContext::seeded("e", &ExecutionSeed::new().var("scan", json!("CMS-1500 ...")));
        let config = json!({ "documentKey": "scan", "fields": ["procedureCode", "diagnosisCode"] });
        let result = DocumentAnalyzerHandler::new(Some(Arc::new(delegate)))
            .execute(&node(NodeType::DocumentAnalyzer, config), &ctx)
            .await
            .unwrap();

        assert_eq!(result.output["extractedFields"]["diagnosisCode"], "M54.5");
        assert_eq!(result.confidence_score, Some(1.0));
    }

    #[tokio::test]
    async fn test_recommendation_requires_delegate() {
        let result = GeminiAnalyzerHandler::new(None)
            .execute(&node(NodeType::GeminiAnalyzer, Value::Null), &ExecutionContext::new("e"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("AI analysis failed"));
    }

    #[tokio::test]
    async fn test_recommendation_output() {
        let delegate = CannedDelegate::default().answer(
            AiOperation::EvaluateNecessity,
            r#"{"decision": "approve", "confidence": 0.88, "reasoning": "Meets criteria",
                "factors": [{"factor": "Diagnosis supports procedure", "impact": "positive", "weight": 0.6}],
                "suggestedActions": ["Pay claim"]}"#,
        );
        let result = GeminiAnalyzerHandler::new(Some(Arc::new(delegate)))
            .execute(&node(NodeType::GeminiAnalyzer, Value::Null), &ExecutionContext::new("e"))
            .await
            .unwrap();

        assert_eq!(result.output["recommendation"], "approve");
        assert_eq!(result.output["factors"][0]["weight"], 0.6);
        assert_eq!(result.confidence_score, Some(0.88));
        assert!(result.next_path.is_none());
    }

    #[tokio::test]
    async fn test_malformed_model_output_fails_node() {
        let delegate = CannedDelegate::default().answer(AiOperation::EvaluateNecessity, "I think it should be approved.");
        let result = GeminiAnalyzerHandler::new(Some(Arc::new(delegate)))
            .execute(&node(NodeType::GeminiAnalyzer, Value::Null), &ExecutionContext::new("e"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Malformed AI response"));
    }

    #[test]
    fn test_render_prompt() {
        let ctx = ExecutionContext::seeded("e", &ExecutionSeed::new().claim("CLM-9").var("claim", json!({ "cpt": "99213" })));
        let rendered = render_prompt("Review {{claimId}} for {{ claim.cpt }}{{missing}}", &ctx);
        assert_eq!(rendered, "Review CLM-9 for 99213");
    }

    #[tokio::test]
    async fn test_fraud_detector_branches_on_anomaly() {
        let handler = FraudDetectorHandler::new(Arc::new(RuleEvaluator));
        let ctx = ExecutionContext::seeded("e", &ExecutionSeed::new().var("anomalyScore", json!(0.95)));
        let result = handler
            .execute(&node(NodeType::FraudDetector, Value::Null), &ctx)
            .await
            .unwrap();
        assert_eq!(result.next_path.as_deref(), Some("true"));
        assert_eq!(result.output["patterns"][0]["type"], "frequency");
        assert_eq!(result.confidence_score, Some(0.92));
    }

    #[tokio::test]
    async fn test_clinical_reasoner_surfaces_delegate_error() {
        let handler = ClinicalReasonerHandler::new(Arc::new(DelegateEvaluator::new(Arc::new(CannedDelegate::default()))));
        let result = handler
            .execute(&node(NodeType::ClinicalReasoner, Value::Null), &ExecutionContext::new("e"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("service unavailable"));
    }

    #[tokio::test]
    async fn test_clinical_reasoner_defaults() {
        let result = ClinicalReasonerHandler::new(Arc::new(RuleEvaluator))
            .execute(&node(NodeType::ClinicalReasoner, Value::Null), &ExecutionContext::new("e"))
            .await
            .unwrap();
        assert_eq!(result.output["medicallyNecessary"], true);
        assert_eq!(result.confidence_score, Some(0.85));
        assert_eq!(result.next_path.as_deref(), Some("true"));
    }
}
