//! Flow graph types for Leadflow.
//!
//! A `Flow` is a directed graph of `Node`s connected by conditional `Edge`s.
//! Nodes are stored the way the editor writes them: a `type`/`subtype` pair
//! plus a free-form `data` mapping. The engine never switches on those strings
//! directly; it calls [`Node::kind`] to materialize a closed [`NodeKind`] sum
//! type with strongly-typed configuration, and matches on that exhaustively.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// A named automation graph. Read-only to the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// UUIDv7. Generated when an imported document omits it.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    /// Human-readable flow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inactive flows are never started by form submissions.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Nodes in editor order. Traversal picks the first matching trigger.
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Flow {
    /// Look up a node by id.
    pub fn node(&self, id: &Uuid) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// The entry point of a run: the first `trigger`/`form_submit` node.
    pub fn trigger_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.node_type == NodeType::Trigger.as_str() && n.subtype == FORM_SUBMIT)
    }

    /// Whether this flow can be started by a contact form submission.
    pub fn has_form_trigger(&self) -> bool {
        self.trigger_node().is_some()
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

pub const FORM_SUBMIT: &str = "form_submit";
pub const SEND_EMAIL: &str = "send_email";
pub const SEND_SMS: &str = "send_sms";
pub const FIELD_CHECK: &str = "field_check";
pub const TIME_DELAY: &str = "time_delay";

/// Default delay for a `time_delay` node without `delay_minutes`.
pub const DEFAULT_DELAY_MINUTES: u32 = 1;

/// One step of a flow, as stored by the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    /// Raw node type (`trigger`, `action`, `condition`, `wait`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Type-scoped subtype (`form_submit`, `send_email`, ...).
    pub subtype: String,
    /// Canvas position. Layout only.
    #[serde(default)]
    pub position: Position,
    /// Subtype-specific configuration fields.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Hierarchical grouping in the editor. Unused by execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

/// Canvas position coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// The four node families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Action,
    Condition,
    Wait,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Trigger,
        NodeType::Action,
        NodeType::Condition,
        NodeType::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Action => "action",
            NodeType::Condition => "condition",
            NodeType::Wait => "wait",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = NodeConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigger" => Ok(NodeType::Trigger),
            "action" => Ok(NodeType::Action),
            "condition" => Ok(NodeType::Condition),
            "wait" => Ok(NodeType::Wait),
            other => Err(NodeConfigError::UnknownType(other.to_string())),
        }
    }
}

/// Typed view of a node's behavior and configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger(TriggerKind),
    Action(ActionKind),
    Condition(ConditionKind),
    Wait(WaitKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    FormSubmit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Plain-text email to the contact. Placeholders are expanded at run time.
    SendEmail { subject: String, body: String },
    /// SMS to the contact's phone number.
    SendSms { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    FieldCheck {
        field_name: Option<String>,
        operator: FieldOperator,
        value: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    TimeDelay { delay_minutes: u32 },
}

/// Comparison applied by a `field_check` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperator {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
}

impl FieldOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldOperator::Exists => "exists",
            FieldOperator::NotExists => "not_exists",
            FieldOperator::Equals => "equals",
            FieldOperator::NotEquals => "not_equals",
            FieldOperator::Contains => "contains",
        }
    }

    /// Operators that compare against the node's `value` field.
    pub fn needs_value(&self) -> bool {
        matches!(
            self,
            FieldOperator::Equals | FieldOperator::NotEquals | FieldOperator::Contains
        )
    }
}

impl FromStr for FieldOperator {
    type Err = NodeConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exists" => Ok(FieldOperator::Exists),
            "not_exists" => Ok(FieldOperator::NotExists),
            "equals" => Ok(FieldOperator::Equals),
            "not_equals" => Ok(FieldOperator::NotEquals),
            "contains" => Ok(FieldOperator::Contains),
            other => Err(NodeConfigError::UnknownOperator(other.to_string())),
        }
    }
}

/// A node whose stored type/subtype/data cannot be turned into a [`NodeKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeConfigError {
    #[error("Unknown node type: {0}")]
    UnknownType(String),

    #[error("Unknown {node_type} subtype: {subtype}")]
    UnknownSubtype { node_type: NodeType, subtype: String },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
}

impl Node {
    /// Parse the stored node type, if it is one of the known families.
    pub fn parsed_type(&self) -> Result<NodeType, NodeConfigError> {
        self.node_type.parse()
    }

    /// Materialize the typed node configuration.
    ///
    /// Missing text fields default to the empty string; a missing
    /// `delay_minutes` defaults to [`DEFAULT_DELAY_MINUTES`].
    pub fn kind(&self) -> Result<NodeKind, NodeConfigError> {
        let node_type = self.parsed_type()?;
        let unknown_subtype = || NodeConfigError::UnknownSubtype {
            node_type,
            subtype: self.subtype.clone(),
        };

        match node_type {
            NodeType::Trigger => match self.subtype.as_str() {
                FORM_SUBMIT => Ok(NodeKind::Trigger(TriggerKind::FormSubmit)),
                _ => Err(unknown_subtype()),
            },
            NodeType::Action => match self.subtype.as_str() {
                SEND_EMAIL => Ok(NodeKind::Action(ActionKind::SendEmail {
                    subject: self.text_field("subject"),
                    body: self.text_field("body"),
                })),
                SEND_SMS => Ok(NodeKind::Action(ActionKind::SendSms {
                    message: self.text_field("message"),
                })),
                _ => Err(unknown_subtype()),
            },
            NodeType::Condition => match self.subtype.as_str() {
                FIELD_CHECK => {
                    let operator = self
                        .data
                        .get("operator")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .parse()?;
                    Ok(NodeKind::Condition(ConditionKind::FieldCheck {
                        field_name: self
                            .data
                            .get("field_name")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        operator,
                        value: self.data.get("value").filter(|v| !v.is_null()).cloned(),
                    }))
                }
                _ => Err(unknown_subtype()),
            },
            NodeType::Wait => match self.subtype.as_str() {
                TIME_DELAY => Ok(NodeKind::Wait(WaitKind::TimeDelay {
                    delay_minutes: self.delay_minutes(),
                })),
                _ => Err(unknown_subtype()),
            },
        }
    }

    /// The configured delay of a wait node, tolerating numeric strings.
    ///
    /// Absent means [`DEFAULT_DELAY_MINUTES`]; unparsable or negative means 0.
    pub fn delay_minutes(&self) -> u32 {
        match self.data.get("delay_minutes") {
            None | Some(Value::Null) => DEFAULT_DELAY_MINUTES,
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(clamp_minutes)
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse::<i64>().map(clamp_minutes).unwrap_or(0),
            Some(_) => 0,
        }
    }

    fn text_field(&self, key: &str) -> String {
        match self.data.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

fn clamp_minutes(n: i64) -> u32 {
    n.clamp(0, u32::MAX as i64) as u32
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// How an edge decides whether it fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    #[default]
    Always,
    IfTrue,
    IfFalse,
    Custom,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Always => "always",
            ConditionType::IfTrue => "if_true",
            ConditionType::IfFalse => "if_false",
            ConditionType::Custom => "custom",
        }
    }
}

impl FromStr for ConditionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(ConditionType::Always),
            "if_true" => Ok(ConditionType::IfTrue),
            "if_false" => Ok(ConditionType::IfFalse),
            "custom" => Ok(ConditionType::Custom),
            other => Err(format!("unknown condition type: {other}")),
        }
    }
}

/// A directed, conditionally-fired connection between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    #[serde(default)]
    pub condition_type: ConditionType,
    /// Only read by `custom` conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_value: Option<Value>,
    /// Display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
