//! Built-in node handlers
//!
//! One handler per node type in the catalog, grouped by category:
//!
//! - **Trigger**: claim intake, prior auth, scheduled batch, webhook
//! - **Processing**: eligibility, policy engine, medical coding
//! - **AI**: document analyzer, AI recommendation, fraud, clinical reasoning
//! - **Control**: decision branch, parallel split, loop iterator
//! - **HITL**: checkpoint, quality review, exception handler
//! - **Output**: decision, notification, API response, audit log
//!
//! Eligibility, policy, fraud and clinical decisions come from a
//! [`ClaimEvaluator`]; model calls go through an [`AiDelegate`]. Both are
//! supplied in [`NodeServices`].

pub mod ai;
pub mod control;
pub mod delegate;
pub mod evaluator;
pub mod hitl;
pub mod output;
pub mod processing;
pub mod services;
mod support;
pub mod trigger;

use std::sync::Arc;

use apex_engine::{NodeRegistry, NodeType};

pub use ai::{ClinicalReasonerHandler, DocumentAnalyzerHandler, FraudDetectorHandler, GeminiAnalyzerHandler};
pub use control::{DecisionBranchHandler, LoopIteratorHandler, ParallelSplitHandler};
pub use delegate::{AiDelegate, AiOperation, AiRequest, DelegateConfig, DelegateError, HttpAiDelegate};
pub use evaluator::{ClaimEvaluator, DelegateEvaluator, RuleEvaluator};
pub use hitl::ReviewHandler;
pub use output::{ApiResponseHandler, AuditLogHandler, DecisionOutputHandler, NotificationHandler};
pub use processing::{EligibilityHandler, MedicalCodingHandler, PolicyHandler};
pub use services::NodeServices;
pub use trigger::TriggerHandler;

/// Register a handler for every catalogued node type
///
/// Existing handlers for those types are replaced.
pub fn register_builtins(registry: &mut NodeRegistry, services: &NodeServices) {
    let trigger = Arc::new(TriggerHandler);
    for node_type in [
        NodeType::ClaimIntake,
        NodeType::PriorAuthRequest,
        NodeType::ScheduledBatch,
        NodeType::Webhook,
    ] {
        registry.register(node_type, trigger.clone());
    }

    registry.register(
        NodeType::DocumentAnalyzer,
        Arc::new(DocumentAnalyzerHandler::new(services.delegate.clone())),
    );
    registry.register(
        NodeType::EligibilityCheck,
        Arc::new(EligibilityHandler::new(services.evaluator.clone())),
    );
    registry.register(NodeType::MedicalCoding, Arc::new(MedicalCodingHandler));
    registry.register(NodeType::PolicyEngine, Arc::new(PolicyHandler::new(services.evaluator.clone())));

    registry.register(
        NodeType::GeminiAnalyzer,
        Arc::new(GeminiAnalyzerHandler::new(services.delegate.clone())),
    );
    registry.register(
        NodeType::FraudDetector,
        Arc::new(FraudDetectorHandler::new(services.evaluator.clone())),
    );
    registry.register(
        NodeType::ClinicalReasoner,
        Arc::new(ClinicalReasonerHandler::new(services.evaluator.clone())),
    );

    registry.register(NodeType::DecisionBranch, Arc::new(DecisionBranchHandler));
    registry.register(NodeType::ParallelSplit, Arc::new(ParallelSplitHandler));
    registry.register(NodeType::LoopIterator, Arc::new(LoopIteratorHandler));

    let review = Arc::new(ReviewHandler);
    for node_type in [NodeType::HitlCheckpoint, NodeType::QualityReview, NodeType::ExceptionHandler] {
        registry.register(node_type, review.clone());
    }

    registry.register(NodeType::DecisionOutput, Arc::new(DecisionOutputHandler));
    registry.register(NodeType::Notification, Arc::new(NotificationHandler));
    registry.register(NodeType::ApiResponse, Arc::new(ApiResponseHandler));
    registry.register(NodeType::AuditLog, Arc::new(AuditLogHandler));

    log::debug!(
        "Registered {} built-in handlers (AI delegate: {})",
        registry.len(),
        services.has_delegate()
    );
}

/// A registry holding every built-in handler
pub fn builtin_registry(services: &NodeServices) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtins(&mut registry, services);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_catalog() {
        let registry = builtin_registry(&NodeServices::default());
        assert!(registry.missing_handlers().is_empty());
        assert_eq!(registry.len(), NodeType::ALL.len());
        assert!(!registry.has_handler(&NodeType::Unknown("legacyRouter".into())));
    }

    #[test]
    fn test_register_builtins_replaces_existing() {
        let mut registry = NodeRegistry::new();
        registry.register_sync(NodeType::AuditLog, |_, _| {
            Ok(apex_engine::HandlerResult::failure("stub"))
        });
        register_builtins(&mut registry, &NodeServices::rules());
        assert_eq!(registry.len(), NodeType::ALL.len());
    }
}
