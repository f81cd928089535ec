//! Execution tracking types: one `FlowExecution` per run, one `ExecutionStep`
//! per node visited, and the `ExecutionContext` threaded through traversal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::contact::Contact;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Data bag threaded through a traversal and snapshotted at suspension points.
///
/// Serializes as `{"contact": {...}, "previous_node_result": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub contact: Contact,
    #[serde(default)]
    pub previous_node_result: Value,
}

impl ExecutionContext {
    pub fn new(contact: Contact) -> Self {
        Self {
            contact,
            previous_node_result: Value::Null,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle of a whole run: `pending -> running -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 4] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

/// Lifecycle of one node visit: `pending -> running -> {completed | failed | skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            other => Err(format!("invalid step status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowExecution
// ---------------------------------------------------------------------------

/// One full run of a flow for one contact, spanning all of its suspensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    pub flow_id: Uuid,
    /// Persisted contact that triggered the run. `None` for manual runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<Uuid>,
    pub status: ExecutionStatus,
    /// Last context snapshot (`{contact, previous_node_result}`).
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// 1-based attempt number, incremented on every retry.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FlowExecution {
    /// A fresh `pending` execution for `contact`.
    pub fn new(flow_id: Uuid, contact: &Contact) -> Self {
        Self {
            id: Uuid::now_v7(),
            flow_id,
            triggered_by: contact.id,
            status: ExecutionStatus::Pending,
            context: ExecutionContext::new(contact.clone()).to_json(),
            result: None,
            attempt: 1,
            started_at: None,
            completed_at: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// The contact stored in the context snapshot, if it can be decoded.
    pub fn contact(&self) -> Option<Contact> {
        self.context
            .get("contact")
            .cloned()
            .and_then(|c| serde_json::from_value(c).ok())
    }
}

// ---------------------------------------------------------------------------
// ExecutionStep
// ---------------------------------------------------------------------------

/// Snapshot of the node taken when its step starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInput {
    pub node_type: String,
    pub node_subtype: String,
    pub node_label: String,
}

/// The record of one node's execution within one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: Uuid,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<StepInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure message, or the reason for a skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionStep {
    /// Wall-clock seconds between start and completion.
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }

    pub fn node_type(&self) -> Option<&str> {
        self.input.as_ref().map(|i| i.node_type.as_str())
    }
}

/// Wait step output key: nodes the wait scheduled a resumption for.
pub const SCHEDULED_NODE_IDS: &str = "scheduled_node_ids";

/// Wait step output key: scheduled nodes whose resumption has fired.
pub const RESUMED_NODE_IDS: &str = "resumed_node_ids";

/// Check `node_id` off the output of a suspended wait step.
///
/// Returns the new output and whether every scheduled node has now resumed.
/// Once they all have, the output becomes `completed_output` with both id
/// lists carried over. Checking off the same node twice is a no-op.
pub fn check_off_resumption(
    current: Option<&Value>,
    node_id: &Uuid,
    completed_output: &Value,
) -> (Value, bool) {
    let scheduled = id_list(current, SCHEDULED_NODE_IDS);
    let mut resumed = id_list(current, RESUMED_NODE_IDS);
    let id = node_id.to_string();
    if !resumed.contains(&id) {
        resumed.push(id);
    }
    let done = scheduled.iter().all(|s| resumed.contains(s));

    let mut output = match (done, current) {
        (true, _) => completed_output.clone(),
        (false, Some(v)) if v.is_object() => v.clone(),
        (false, _) => Value::Object(serde_json::Map::new()),
    };
    if let Value::Object(map) = &mut output {
        map.insert(SCHEDULED_NODE_IDS.to_string(), serde_json::json!(scheduled));
        map.insert(RESUMED_NODE_IDS.to_string(), serde_json::json!(resumed));
    }
    (output, done)
}

fn id_list(output: Option<&Value>, key: &str) -> Vec<String> {
    output
        .and_then(|v| v.get(key))
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Filter for listing executions (newest first).
#[derive(Debug, Clone)]
pub struct ExecutionFilter {
    pub flow_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ExecutionFilter {
    fn default() -> Self {
        Self {
            flow_id: None,
            status: None,
            limit: 20,
            offset: 0,
        }
    }
}

/// Aggregate counts for the monitoring surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub pending_executions: u64,
    pub running_executions: u64,
    /// Per-day totals over the trailing window, oldest first.
    pub recent_executions: Vec<DailyExecutionCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyExecutionCount {
    pub date: NaiveDate,
    pub count: u64,
    pub successful: u64,
    pub failed: u64,
}
