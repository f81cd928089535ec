//! Durable delayed work: the payload a wait node leaves behind, and the
//! queue record that carries it until it is due.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::contact::Contact;

/// Task type for resuming a suspended execution at a node.
pub const RESUME_FLOW_TASK: &str = "resume_flow";

/// Everything needed to continue an execution after a delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeTask {
    pub flow_id: Uuid,
    pub contact: Contact,
    /// Node the resumed traversal starts from.
    pub node_id: Uuid,
    pub execution_id: Uuid,
    /// Context snapshot (`{contact, previous_node_result}`) at scheduling time.
    pub context: Value,
    /// The wait step that scheduled this task; completed on resumption.
    pub origin_step_id: Uuid,
    /// Execution attempt the task belongs to. Stale attempts are dropped.
    pub attempt: u32,
}

/// A queued task as stored by a `TaskQueue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub task_type: String,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
    /// Number of times the task has been claimed.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// Build an unclaimed task due at `run_at`.
    pub fn new(task_type: impl Into<String>, payload: Value, run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_type: task_type.into(),
            payload,
            run_at,
            attempts: 0,
            locked_until: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Decode the payload of a `resume_flow` task.
    pub fn resume_payload(&self) -> Result<ResumeTask, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
