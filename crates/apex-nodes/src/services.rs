//! Collaborators shared by the built-in handlers

use std::sync::Arc;

use crate::delegate::AiDelegate;
use crate::evaluator::{ClaimEvaluator, DelegateEvaluator, RuleEvaluator};

/// What handlers reach outside the execution context for
///
/// Without a delegate, AI handlers either fall back to context data
/// (document analysis) or fail the node (recommendation).
#[derive(Clone)]
pub struct NodeServices {
    pub evaluator: Arc<dyn ClaimEvaluator>,
    pub delegate: Option<Arc<dyn AiDelegate>>,
}

impl NodeServices {
    /// Rule-based evaluation, no AI delegate
    pub fn rules() -> Self {
        Self {
            evaluator: Arc::new(RuleEvaluator),
            delegate: None,
        }
    }

    /// Route AI work and fraud/clinical evaluation through `delegate`
    pub fn with_delegate(delegate: Arc<dyn AiDelegate>) -> Self {
        Self {
            evaluator: Arc::new(DelegateEvaluator::new(delegate.clone())),
            delegate: Some(delegate),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ClaimEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }
}

impl Default for NodeServices {
    fn default() -> Self {
        Self::rules()
    }
}
