//! Human-in-the-loop checkpoints
//!
//! A checkpoint is created when a handler asks for human review. It is
//! `pending` until a reviewer approves or rejects it; both decisions are
//! terminal. `escalated` is applied by the caller once `escalateAt`
//! passes (nothing escalates on its own) and stays resolvable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::node_config::{HitlConfig, NodeConfig};
use crate::types::{NodeId, WorkflowNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
}

impl CheckpointStatus {
    /// Still awaiting a decision
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Escalated)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssigneeType {
    User,
    #[default]
    Team,
    Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    #[serde(rename = "type")]
    pub assignee_type: AssigneeType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Reviewer decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointDecision {
    Approve,
    Reject,
}

impl CheckpointDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// What the reviewer sees
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckpointContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_recommendation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previous_decisions: Vec<String>,
}

/// SLA and escalation windows applied when a node config sets none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointTimers {
    pub sla_hours: u32,
    pub escalation_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitlCheckpoint {
    pub id: String,
    pub execution_id: String,
    pub node_id: NodeId,
    pub node_name: String,
    pub status: CheckpointStatus,
    pub assignee: Assignee,
    pub created_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub escalate_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
    #[serde(default)]
    pub require_reason: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<CheckpointDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub context: CheckpointContext,
}

impl HitlCheckpoint {
    /// Build a pending checkpoint for a node, taking assignment and
    /// windows from its HITL config
    pub fn for_node(
        execution_id: &str,
        node: &WorkflowNode,
        context: CheckpointContext,
        timers: CheckpointTimers,
        now: DateTime<Utc>,
    ) -> Self {
        let fallback = HitlConfig::default();
        let config = match &node.data.config {
            NodeConfig::Hitl(config) => config,
            _ => &fallback,
        };

        let sla_hours = config.sla_hours.unwrap_or(timers.sla_hours);
        let escalation_hours = config.escalation_hours.unwrap_or(timers.escalation_hours);

        let assignee = Assignee {
            assignee_type: config.assignee_type.unwrap_or_default(),
            id: config
                .assignee_id
                .clone()
                .or_else(|| config.reviewer.clone())
                .unwrap_or_else(|| "unassigned".to_string()),
            name: config.assignee_name.clone().or_else(|| config.reviewer.clone()),
        };

        Self {
            id: format!("hitl-{}", uuid::Uuid::new_v4()),
            execution_id: execution_id.to_string(),
            node_id: node.id.clone(),
            node_name: node.data.label.clone(),
            status: CheckpointStatus::Pending,
            assignee,
            created_at: now,
            due_at: now + Duration::hours(i64::from(sla_hours)),
            escalate_at: now + Duration::hours(i64::from(escalation_hours)),
            escalate_to: config.escalate_to.clone(),
            require_reason: config.require_reason.unwrap_or(false),
            completed_at: None,
            completed_by: None,
            decision: None,
            reason: None,
            context,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == CheckpointStatus::Pending && now >= self.escalate_at
    }
}

/// Tracks checkpoints of the current run
///
/// Resolved checkpoints are kept for the audit trail; only open ones
/// count as pending.
#[derive(Debug, Clone, Default)]
pub struct CheckpointManager {
    checkpoints: Vec<HitlCheckpoint>,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, checkpoint: HitlCheckpoint) {
        log::info!(
            "Checkpoint '{}' created for node '{}' (assignee {})",
            checkpoint.id,
            checkpoint.node_id,
            checkpoint.assignee.id
        );
        self.checkpoints.push(checkpoint);
    }

    pub fn get(&self, id: &str) -> Option<&HitlCheckpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    pub fn all(&self) -> &[HitlCheckpoint] {
        &self.checkpoints
    }

    /// Open checkpoints in creation order
    pub fn pending(&self) -> Vec<&HitlCheckpoint> {
        self.checkpoints.iter().filter(|c| c.is_open()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.checkpoints.iter().filter(|c| c.is_open()).count()
    }

    pub fn has_pending(&self) -> bool {
        self.checkpoints.iter().any(|c| c.is_open())
    }

    /// Decisions already taken in this run, oldest first
    pub fn decisions(&self) -> Vec<String> {
        self.checkpoints
            .iter()
            .filter_map(|c| c.decision.map(|d| format!("{}: {}", c.node_name, d.as_str())))
            .collect()
    }

    /// Apply a reviewer decision
    ///
    /// Fails if the id is unknown, the checkpoint was already decided,
    /// or the node demands a reason and none was given.
    pub fn resolve(
        &mut self,
        id: &str,
        decision: CheckpointDecision,
        reason: Option<String>,
        resolved_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<HitlCheckpoint> {
        let checkpoint = self
            .checkpoints
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::CheckpointNotFound(id.to_string()))?;

        if !checkpoint.is_open() {
            return Err(EngineError::CheckpointAlreadyResolved(id.to_string()));
        }
        let reason = reason.filter(|r| !r.trim().is_empty());
        if checkpoint.require_reason && reason.is_none() {
            return Err(EngineError::ReasonRequired(id.to_string()));
        }

        checkpoint.status = match decision {
            CheckpointDecision::Approve => CheckpointStatus::Approved,
            CheckpointDecision::Reject => CheckpointStatus::Rejected,
        };
        checkpoint.decision = Some(decision);
        checkpoint.reason = reason;
        checkpoint.completed_by = resolved_by;
        checkpoint.completed_at = Some(now);

        log::info!("Checkpoint '{}' resolved: {}", id, decision.as_str());
        Ok(checkpoint.clone())
    }

    /// Mark a pending checkpoint escalated
    pub fn escalate(&mut self, id: &str) -> Result<HitlCheckpoint> {
        let checkpoint = self
            .checkpoints
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::CheckpointNotFound(id.to_string()))?;

        if !checkpoint.is_open() {
            return Err(EngineError::CheckpointAlreadyResolved(id.to_string()));
        }
        checkpoint.status = CheckpointStatus::Escalated;
        log::warn!(
            "Checkpoint '{}' escalated{}",
            id,
            checkpoint
                .escalate_to
                .as_deref()
                .map(|to| format!(" to {}", to))
                .unwrap_or_default()
        );
        Ok(checkpoint.clone())
    }

    /// Escalate every pending checkpoint whose escalation time has passed
    pub fn escalate_overdue(&mut self, now: DateTime<Utc>) -> Vec<HitlCheckpoint> {
        let overdue: Vec<String> = self
            .checkpoints
            .iter()
            .filter(|c| c.is_overdue(now))
            .map(|c| c.id.clone())
            .collect();

        overdue
            .iter()
            .filter_map(|id| self.escalate(id).ok())
            .collect()
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;
    use serde_json::json;

    const TIMERS: CheckpointTimers = CheckpointTimers {
        sla_hours: 24,
        escalation_hours: 48,
    };

    fn review_node(config: serde_json::Value) -> WorkflowNode {
        let mut node = WorkflowNode::new("review", NodeType::HitlCheckpoint, "Manual Review");
        node.data.config = NodeConfig::parse(&NodeType::HitlCheckpoint, config);
        node
    }

    fn checkpoint(config: serde_json::Value, now: DateTime<Utc>) -> HitlCheckpoint {
        HitlCheckpoint::for_node("exec-1", &review_node(config), CheckpointContext::default(), TIMERS, now)
    }

    #[test]
    fn test_checkpoint_windows() {
        let now = Utc::now();
        let cp = checkpoint(json!({}), now);
        assert_eq!(cp.status, CheckpointStatus::Pending);
        assert_eq!(cp.due_at - now, Duration::hours(24));
        assert_eq!(cp.escalate_at - now, Duration::hours(48));
        assert_eq!(cp.assignee.assignee_type, AssigneeType::Team);
        assert_eq!(cp.assignee.id, "unassigned");

        let cp = checkpoint(
            json!({ "slaHours": 4, "escalationHours": 8, "assigneeType": "user", "assigneeId": "u-7" }),
            now,
        );
        assert_eq!(cp.due_at - now, Duration::hours(4));
        assert_eq!(cp.escalate_at - now, Duration::hours(8));
        assert_eq!(cp.assignee.assignee_type, AssigneeType::User);
        assert_eq!(cp.assignee.id, "u-7");
    }

    #[test]
    fn test_resolve_once() {
        let now = Utc::now();
        let mut manager = CheckpointManager::new();
        let cp = checkpoint(json!({ "reviewer": "claims-team" }), now);
        let id = cp.id.clone();
        manager.insert(cp);
        assert_eq!(manager.pending_count(), 1);

        let resolved = manager
            .resolve(&id, CheckpointDecision::Approve, Some("looks fine".into()), Some("alice".into()), now)
            .unwrap();
        assert_eq!(resolved.status, CheckpointStatus::Approved);
        assert_eq!(resolved.completed_by.as_deref(), Some("alice"));
        assert!(!manager.has_pending());

        let again = manager.resolve(&id, CheckpointDecision::Reject, None, None, now);
        assert!(matches!(again, Err(EngineError::CheckpointAlreadyResolved(_))));
        assert_eq!(manager.decisions(), vec!["Manual Review: approve".to_string()]);
    }

    #[test]
    fn test_resolve_unknown() {
        let mut manager = CheckpointManager::new();
        let result = manager.resolve("nope", CheckpointDecision::Approve, None, None, Utc::now());
        assert!(matches!(result, Err(EngineError::CheckpointNotFound(_))));
    }

    #[test]
    fn test_require_reason() {
        let now = Utc::now();
        let mut manager = CheckpointManager::new();
        let cp = checkpoint(json!({ "requireReason": true }), now);
        let id = cp.id.clone();
        manager.insert(cp);

        let missing = manager.resolve(&id, CheckpointDecision::Reject, Some("  ".into()), None, now);
        assert!(matches!(missing, Err(EngineError::ReasonRequired(_))));
        assert!(manager.has_pending());

        let ok = manager.resolve(&id, CheckpointDecision::Reject, Some("duplicate claim".into()), None, now);
        assert_eq!(ok.unwrap().status, CheckpointStatus::Rejected);
    }

    #[test]
    fn test_escalate_overdue() {
        let created = Utc::now();
        let mut manager = CheckpointManager::new();
        let fast = checkpoint(json!({ "escalationHours": 1 }), created);
        let slow = checkpoint(json!({}), created);
        let fast_id = fast.id.clone();
        manager.insert(fast);
        manager.insert(slow);

        let escalated = manager.escalate_overdue(created + Duration::hours(2));
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].id, fast_id);
        assert_eq!(manager.get(&fast_id).unwrap().status, CheckpointStatus::Escalated);

        // Escalated checkpoints still count as pending and can be decided
        assert_eq!(manager.pending_count(), 2);
        let resolved = manager.resolve(&fast_id, CheckpointDecision::Approve, None, None, created);
        assert!(resolved.is_ok());
    }
}
