//! Engine configuration
//!
//! Loaded from JSON; every field has a default so partial files work.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointTimers;
use crate::error::Result;

fn default_step_delay_ms() -> u64 {
    300
}

fn default_pause_poll_ms() -> u64 {
    100
}

fn default_max_steps() -> usize {
    10_000
}

fn default_sla_hours() -> u32 {
    24
}

fn default_escalation_hours() -> u32 {
    48
}

fn default_history_limit() -> usize {
    100
}

/// Execution tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Visual pacing inserted before descending to the next nodes
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Poll interval while a run is paused
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,
    /// Node executions allowed per traversal before the run is failed
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Checkpoint due time when a node config sets none
    #[serde(default = "default_sla_hours")]
    pub default_sla_hours: u32,
    /// Checkpoint escalation time when a node config sets none
    #[serde(default = "default_escalation_hours")]
    pub default_escalation_hours: u32,
    /// Undo snapshots kept by the workflow store
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            pause_poll_ms: default_pause_poll_ms(),
            max_steps: default_max_steps(),
            default_sla_hours: default_sla_hours(),
            default_escalation_hours: default_escalation_hours(),
            history_limit: default_history_limit(),
        }
    }
}

impl EngineConfig {
    /// No pacing delay; the rest at defaults
    pub fn immediate() -> Self {
        Self {
            step_delay_ms: 0,
            pause_poll_ms: 5,
            ..Self::default()
        }
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        // A zero interval would spin
        Duration::from_millis(self.pause_poll_ms.max(1))
    }

    pub fn checkpoint_timers(&self) -> CheckpointTimers {
        CheckpointTimers {
            sla_hours: self.default_sla_hours,
            escalation_hours: self.default_escalation_hours,
        }
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file, falling back to defaults when it is absent
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            log::debug!("No engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_json(&contents)
    }
}
