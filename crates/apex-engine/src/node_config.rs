//! Typed per-node configuration
//!
//! Graph files carry `data.config` as a free-form object. It is parsed
//! into a variant selected by the node type, so handlers match on a
//! closed set instead of probing keys. Keys a variant does not know
//! are kept in `extra` and written back unchanged.
//!
//! A config that does not fit its node type is kept verbatim as
//! [`NodeConfig::Invalid`]; validation reports it and the handler
//! fails the node.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checkpoint::AssigneeType;
use crate::condition::{Condition, ConditionLogic, ConditionOperator};
use crate::types::NodeType;

/// Configuration for claim intake, prior auth, batch and webhook triggers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriggerConfig {
    /// Intake channel (edi, portal, fax, api, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<bool>,
    /// Cron expression for scheduled batches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Configuration for eligibility, policy, fraud and clinical evaluators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_set: Option<String>,
    /// Evaluator-specific cut-off (amount limit, anomaly score, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidelines: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentAnalysisConfig {
    /// Context key holding the document content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_key: Option<String>,
    /// Fields to extract
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MedicalCodingConfig {
    /// Code systems to validate (cpt, icd10)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_systems: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Configuration for model-backed analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiAnalysisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt with `{{key}}` placeholders resolved against the context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decision branch condition(s)
///
/// Either a single `conditionField`/`operator`/`compareValue` triple
/// (`field`/`value` accepted as shorthand) or a `conditions` list
/// combined with `logic`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecisionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<ConditionOperator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logic: Option<ConditionLogic>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DecisionConfig {
    /// The single-condition form, if one is configured
    pub fn single_condition(&self) -> Option<Condition> {
        let field = self.condition_field.as_ref().or(self.field.as_ref());
        if field.is_none() && self.operator.is_none() {
            return None;
        }
        Some(Condition {
            field: field.cloned().unwrap_or_default(),
            operator: self
                .operator
                .clone()
                .unwrap_or_else(|| ConditionOperator::Unknown(String::new())),
            value: self
                .compare_value
                .as_ref()
                .or(self.value.as_ref())
                .cloned()
                .unwrap_or(Value::Null),
        })
    }

    /// All configured conditions; the list form wins over the single form
    pub fn all_conditions(&self) -> Vec<Condition> {
        match &self.conditions {
            Some(list) if !list.is_empty() => list.clone(),
            _ => self.single_condition().into_iter().collect(),
        }
    }

    pub fn has_condition(&self) -> bool {
        !self.all_conditions().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParallelSplitConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoopConfig {
    /// Context key (or dotted path) of the collection to iterate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Review assignment for checkpoint, quality review and exception nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HitlConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_type: Option<AssigneeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_reason: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HitlConfig {
    pub fn has_reviewer(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.reviewer) || set(&self.assignee_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecisionOutputConfig {
    /// approve, deny, pend or refer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_member: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_provider: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiResponseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditLogConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Configuration of a node, keyed by node type
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Trigger(TriggerConfig),
    Evaluation(EvaluationConfig),
    DocumentAnalysis(DocumentAnalysisConfig),
    MedicalCoding(MedicalCodingConfig),
    AiAnalysis(AiAnalysisConfig),
    Decision(DecisionConfig),
    ParallelSplit(ParallelSplitConfig),
    Loop(LoopConfig),
    Hitl(HitlConfig),
    DecisionOutput(DecisionOutputConfig),
    Notification(NotificationConfig),
    ApiResponse(ApiResponseConfig),
    AuditLog(AuditLogConfig),
    /// Config of a node type outside the catalog, kept as-is
    Other(Value),
    /// Config that failed to parse for its node type
    Invalid { raw: Value, error: String },
}

/// Which variant a node type takes
#[derive(Debug, Clone, Copy)]
enum ConfigKind {
    Trigger,
    Evaluation,
    DocumentAnalysis,
    MedicalCoding,
    AiAnalysis,
    Decision,
    ParallelSplit,
    Loop,
    Hitl,
    DecisionOutput,
    Notification,
    ApiResponse,
    AuditLog,
}

fn kind_of(node_type: &NodeType) -> Option<ConfigKind> {
    use NodeType::*;
    let kind = match node_type {
        ClaimIntake | PriorAuthRequest | ScheduledBatch | Webhook => ConfigKind::Trigger,
        EligibilityCheck | PolicyEngine | FraudDetector | ClinicalReasoner => ConfigKind::Evaluation,
        DocumentAnalyzer => ConfigKind::DocumentAnalysis,
        MedicalCoding => ConfigKind::MedicalCoding,
        GeminiAnalyzer => ConfigKind::AiAnalysis,
        DecisionBranch => ConfigKind::Decision,
        ParallelSplit => ConfigKind::ParallelSplit,
        LoopIterator => ConfigKind::Loop,
        HitlCheckpoint | QualityReview | ExceptionHandler => ConfigKind::Hitl,
        DecisionOutput => ConfigKind::DecisionOutput,
        Notification => ConfigKind::Notification,
        ApiResponse => ConfigKind::ApiResponse,
        AuditLog => ConfigKind::AuditLog,
        Unknown(_) => return None,
    };
    Some(kind)
}

fn parse_as<T, F>(raw: Value, wrap: F) -> NodeConfig
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(T) -> NodeConfig,
{
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(config) => wrap(config),
        Err(e) => NodeConfig::Invalid {
            raw,
            error: e.to_string(),
        },
    }
}

impl NodeConfig {
    /// Parse a raw config object for the given node type
    ///
    /// A missing (`null`) config yields the type's default.
    pub fn parse(node_type: &NodeType, raw: Value) -> Self {
        let Some(kind) = kind_of(node_type) else {
            return NodeConfig::Other(raw);
        };
        if raw.is_null() {
            return Self::default_for(node_type);
        }
        if !raw.is_object() {
            return NodeConfig::Invalid {
                raw,
                error: "config must be an object".to_string(),
            };
        }

        match kind {
            ConfigKind::Trigger => parse_as(raw, NodeConfig::Trigger),
            ConfigKind::Evaluation => parse_as(raw, NodeConfig::Evaluation),
            ConfigKind::DocumentAnalysis => parse_as(raw, NodeConfig::DocumentAnalysis),
            ConfigKind::MedicalCoding => parse_as(raw, NodeConfig::MedicalCoding),
            ConfigKind::AiAnalysis => parse_as(raw, NodeConfig::AiAnalysis),
            ConfigKind::Decision => parse_as(raw, NodeConfig::Decision),
            ConfigKind::ParallelSplit => parse_as(raw, NodeConfig::ParallelSplit),
            ConfigKind::Loop => parse_as(raw, NodeConfig::Loop),
            ConfigKind::Hitl => parse_as(raw, NodeConfig::Hitl),
            ConfigKind::DecisionOutput => parse_as(raw, NodeConfig::DecisionOutput),
            ConfigKind::Notification => parse_as(raw, NodeConfig::Notification),
            ConfigKind::ApiResponse => parse_as(raw, NodeConfig::ApiResponse),
            ConfigKind::AuditLog => parse_as(raw, NodeConfig::AuditLog),
        }
    }

    /// Empty configuration of the variant a node type takes
    pub fn default_for(node_type: &NodeType) -> Self {
        match kind_of(node_type) {
            None => NodeConfig::Other(Value::Object(Map::new())),
            Some(ConfigKind::Trigger) => NodeConfig::Trigger(Default::default()),
            Some(ConfigKind::Evaluation) => NodeConfig::Evaluation(Default::default()),
            Some(ConfigKind::DocumentAnalysis) => NodeConfig::DocumentAnalysis(Default::default()),
            Some(ConfigKind::MedicalCoding) => NodeConfig::MedicalCoding(Default::default()),
            Some(ConfigKind::AiAnalysis) => NodeConfig::AiAnalysis(Default::default()),
            Some(ConfigKind::Decision) => NodeConfig::Decision(Default::default()),
            Some(ConfigKind::ParallelSplit) => NodeConfig::ParallelSplit(Default::default()),
            Some(ConfigKind::Loop) => NodeConfig::Loop(Default::default()),
            Some(ConfigKind::Hitl) => NodeConfig::Hitl(Default::default()),
            Some(ConfigKind::DecisionOutput) => NodeConfig::DecisionOutput(Default::default()),
            Some(ConfigKind::Notification) => NodeConfig::Notification(Default::default()),
            Some(ConfigKind::ApiResponse) => NodeConfig::ApiResponse(Default::default()),
            Some(ConfigKind::AuditLog) => NodeConfig::AuditLog(Default::default()),
        }
    }

    /// Wire form of this config
    pub fn to_value(&self) -> Value {
        let result = match self {
            NodeConfig::Trigger(c) => serde_json::to_value(c),
            NodeConfig::Evaluation(c) => serde_json::to_value(c),
            NodeConfig::DocumentAnalysis(c) => serde_json::to_value(c),
            NodeConfig::MedicalCoding(c) => serde_json::to_value(c),
            NodeConfig::AiAnalysis(c) => serde_json::to_value(c),
            NodeConfig::Decision(c) => serde_json::to_value(c),
            NodeConfig::ParallelSplit(c) => serde_json::to_value(c),
            NodeConfig::Loop(c) => serde_json::to_value(c),
            NodeConfig::Hitl(c) => serde_json::to_value(c),
            NodeConfig::DecisionOutput(c) => serde_json::to_value(c),
            NodeConfig::Notification(c) => serde_json::to_value(c),
            NodeConfig::ApiResponse(c) => serde_json::to_value(c),
            NodeConfig::AuditLog(c) => serde_json::to_value(c),
            NodeConfig::Other(raw) | NodeConfig::Invalid { raw, .. } => return raw.clone(),
        };
        result.unwrap_or_else(|e| {
            log::warn!("Failed to serialize node config: {}", e);
            Value::Object(Map::new())
        })
    }

    /// Parse error, if the config did not fit its node type
    pub fn parse_error(&self) -> Option<&str> {
        match self {
            NodeConfig::Invalid { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_single_condition() {
        let config = NodeConfig::parse(
            &NodeType::DecisionBranch,
            json!({ "conditionField": "amount", "operator": "greaterThan", "compareValue": "1000" }),
        );
        let NodeConfig::Decision(decision) = config else {
            panic!("Expected decision config");
        };
        let conditions = decision.all_conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].field, "amount");
        assert_eq!(conditions[0].operator, ConditionOperator::GreaterThan);
        assert_eq!(conditions[0].value, json!("1000"));
    }

    #[test]
    fn test_decision_shorthand_keys() {
        let config = NodeConfig::parse(
            &NodeType::DecisionBranch,
            json!({ "field": "amount", "operator": "lessThan", "value": 50 }),
        );
        let NodeConfig::Decision(decision) = config else {
            panic!("Expected decision config");
        };
        let condition = decision.single_condition().unwrap();
        assert_eq!(condition.field, "amount");
        assert_eq!(condition.value, json!(50));
    }

    #[test]
    fn test_unrecognized_keys_round_trip() {
        let raw = json!({ "reviewer": "team-a", "slaHours": 8, "color": "red", "nested": { "k": [1, 2] } });
        let config = NodeConfig::parse(&NodeType::HitlCheckpoint, raw.clone());
        assert!(matches!(config, NodeConfig::Hitl(_)));
        assert_eq!(config.to_value(), raw);
    }

    #[test]
    fn test_invalid_config_is_kept() {
        let raw = json!({ "slaHours": "soon" });
        let config = NodeConfig::parse(&NodeType::QualityReview, raw.clone());
        assert!(config.parse_error().is_some());
        assert_eq!(config.to_value(), raw);

        let config = NodeConfig::parse(&NodeType::AuditLog, json!("not an object"));
        assert!(config.parse_error().is_some());
    }

    #[test]
    fn test_null_config_uses_default() {
        let config = NodeConfig::parse(&NodeType::ClaimIntake, Value::Null);
        assert_eq!(config, NodeConfig::Trigger(TriggerConfig::default()));
        assert_eq!(config.to_value(), json!({}));
    }

    #[test]
    fn test_unknown_type_config_passthrough() {
        let raw = json!({ "anything": true });
        let config = NodeConfig::parse(&NodeType::from("teleport"), raw.clone());
        assert_eq!(config, NodeConfig::Other(raw.clone()));
        assert_eq!(config.to_value(), raw);
    }

    #[test]
    fn test_hitl_reviewer_presence() {
        let mut config = HitlConfig::default();
        assert!(!config.has_reviewer());
        config.assignee_id = Some("  ".to_string());
        assert!(!config.has_reviewer());
        config.reviewer = Some("claims-team".to_string());
        assert!(config.has_reviewer());
    }
}
