//! Node type catalog
//!
//! Static metadata for every node type: category, display info and
//! input/output arity. This is a pure lookup table. Validation uses the
//! category, the engine uses it for labels, and routing itself is driven
//! by `sourceHandle` matching rather than arity.

use serde::Serialize;

use crate::types::{NodeCategory, NodeType};

/// Metadata for a node type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub node_type: NodeType,
    pub category: NodeCategory,
    pub label: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    /// 0 for triggers, 1 otherwise
    pub inputs: u8,
    /// 0 for outputs, 1 linear, 2 binary, 3 multi-way
    pub outputs: u8,
}

impl NodeMetadata {
    /// Handle labels of the outputs, empty for linear/terminal nodes
    pub fn output_handles(&self) -> &'static [&'static str] {
        match self.outputs {
            2 => &["true", "false"],
            3 => &["a", "b", "c"],
            _ => &[],
        }
    }

    pub fn is_branching(&self) -> bool {
        self.outputs > 1
    }
}

const TRIGGER_COLOR: &str = "#06B6D4";
const PROCESSING_COLOR: &str = "#8B5CF6";
const AI_COLOR: &str = "#10B981";
const CONTROL_COLOR: &str = "#F59E0B";
const HITL_COLOR: &str = "#EF4444";
const OUTPUT_COLOR: &str = "#64748B";

macro_rules! node {
    ($ty:ident, $cat:ident, $label:expr, $desc:expr, $icon:expr, $color:expr, $in:expr, $out:expr) => {
        NodeMetadata {
            node_type: NodeType::$ty,
            category: NodeCategory::$cat,
            label: $label,
            description: $desc,
            icon: $icon,
            color: $color,
            inputs: $in,
            outputs: $out,
        }
    };
}

static CATALOG: [NodeMetadata; 21] = [
    node!(ClaimIntake, Trigger, "Claim Intake", "Workflow entry for new claims", "📥", TRIGGER_COLOR, 0, 1),
    node!(PriorAuthRequest, Trigger, "Prior Auth Request", "Prior authorization trigger", "🔐", TRIGGER_COLOR, 0, 1),
    node!(ScheduledBatch, Trigger, "Scheduled Batch", "Time-based batch processing", "⏰", TRIGGER_COLOR, 0, 1),
    node!(Webhook, Trigger, "Webhook", "External system integration", "🔗", TRIGGER_COLOR, 0, 1),
    node!(DocumentAnalyzer, Processing, "Document Analyzer", "Extract data from medical documents", "📄", PROCESSING_COLOR, 1, 1),
    node!(EligibilityCheck, Processing, "Eligibility Check", "Verify member eligibility", "✓", PROCESSING_COLOR, 1, 2),
    node!(MedicalCoding, Processing, "Medical Coding", "ICD-10/CPT code validation", "🏥", PROCESSING_COLOR, 1, 1),
    node!(PolicyEngine, Processing, "Policy Engine", "Business rules evaluation", "📋", PROCESSING_COLOR, 1, 2),
    node!(GeminiAnalyzer, Ai, "Gemini Analyzer", "LLM-powered analysis", "✨", AI_COLOR, 1, 1),
    node!(FraudDetector, Ai, "Fraud Detector", "Anomaly/fraud detection", "🛡️", AI_COLOR, 1, 2),
    node!(ClinicalReasoner, Ai, "Clinical Reasoner", "Medical necessity evaluation", "🧠", AI_COLOR, 1, 2),
    node!(DecisionBranch, Control, "Decision Branch", "Conditional routing", "◇", CONTROL_COLOR, 1, 2),
    node!(ParallelSplit, Control, "Parallel Split", "Concurrent execution", "⫸", CONTROL_COLOR, 1, 3),
    node!(LoopIterator, Control, "Loop Iterator", "Iterate over collections", "🔄", CONTROL_COLOR, 1, 2),
    node!(HitlCheckpoint, Hitl, "HITL Checkpoint", "Human review/approval", "👤", HITL_COLOR, 1, 2),
    node!(QualityReview, Hitl, "Quality Review", "QA sampling and audit", "✅", HITL_COLOR, 1, 2),
    node!(ExceptionHandler, Hitl, "Exception Handler", "Manual exception routing", "⚠️", HITL_COLOR, 1, 2),
    node!(DecisionOutput, Output, "Decision Output", "Claim approval/denial", "📤", OUTPUT_COLOR, 1, 0),
    node!(Notification, Output, "Notification", "Send alerts/notifications", "📧", OUTPUT_COLOR, 1, 0),
    node!(ApiResponse, Output, "API Response", "External system callback", "🔌", OUTPUT_COLOR, 1, 0),
    node!(AuditLog, Output, "Audit Log", "Explicit audit entry", "📝", OUTPUT_COLOR, 1, 0),
];

/// Metadata for a node type; `None` for tags outside the catalog
pub fn lookup(node_type: &NodeType) -> Option<&'static NodeMetadata> {
    CATALOG.iter().find(|m| &m.node_type == node_type)
}

/// The full catalog in palette order
pub fn catalog() -> &'static [NodeMetadata] {
    &CATALOG
}

/// Catalog entries of one category
pub fn by_category(category: NodeCategory) -> impl Iterator<Item = &'static NodeMetadata> {
    CATALOG.iter().filter(move |m| m.category == category)
}
