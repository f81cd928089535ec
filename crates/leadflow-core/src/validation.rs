//! Flow definition validation against the node-type catalog.
//!
//! The catalog lists every node type, its subtypes and their configuration
//! fields. Validation runs when a flow is saved; the engine itself never
//! consults the catalog and reports bad nodes at execution time instead.

use std::collections::{BTreeMap, HashSet};

use leadflow_types::flow::{ConditionType, Flow, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// How a configuration field is entered and checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Textarea,
    /// One of a fixed set of keys.
    Select { options: Vec<String> },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeSpec {
    pub label: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeSpec {
    pub label: String,
    pub subtypes: BTreeMap<String, SubtypeSpec>,
}

/// Every node type the editor may place, keyed by `type` then `subtype`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCatalog {
    pub types: BTreeMap<String, NodeTypeSpec>,
}

fn field(key: &str, label: &str, kind: FieldKind, required: bool) -> (String, FieldSpec) {
    (
        key.to_string(),
        FieldSpec {
            label: label.to_string(),
            kind,
            required,
        },
    )
}

fn subtype(label: &str, fields: Vec<(String, FieldSpec)>) -> SubtypeSpec {
    SubtypeSpec {
        label: label.to_string(),
        fields: fields.into_iter().collect(),
    }
}

fn options(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

impl NodeCatalog {
    /// The node types the engine can execute.
    pub fn builtin() -> Self {
        let mut types = BTreeMap::new();

        types.insert(
            "trigger".to_string(),
            NodeTypeSpec {
                label: "Trigger".to_string(),
                subtypes: BTreeMap::from([(
                    "form_submit".to_string(),
                    subtype("Form Submission", vec![]),
                )]),
            },
        );

        types.insert(
            "action".to_string(),
            NodeTypeSpec {
                label: "Action".to_string(),
                subtypes: BTreeMap::from([
                    (
                        "send_email".to_string(),
                        subtype(
                            "Send Email",
                            vec![
                                field("subject", "Subject", FieldKind::Text, true),
                                field("body", "Email Body", FieldKind::Textarea, true),
                            ],
                        ),
                    ),
                    (
                        "send_sms".to_string(),
                        subtype("Send SMS", vec![field("message", "Message", FieldKind::Textarea, true)]),
                    ),
                ]),
            },
        );

        types.insert(
            "condition".to_string(),
            NodeTypeSpec {
                label: "Condition".to_string(),
                subtypes: BTreeMap::from([(
                    "field_check".to_string(),
                    subtype(
                        "Check Field",
                        vec![
                            field(
                                "field_name",
                                "Field to Check",
                                FieldKind::Select {
                                    options: options(&["name", "email", "phone"]),
                                },
                                true,
                            ),
                            field(
                                "operator",
                                "Condition",
                                FieldKind::Select {
                                    options: options(&[
                                        "exists",
                                        "not_exists",
                                        "equals",
                                        "not_equals",
                                        "contains",
                                    ]),
                                },
                                true,
                            ),
                            field("value", "Value to Compare", FieldKind::Text, false),
                        ],
                    ),
                )]),
            },
        );

        types.insert(
            "wait".to_string(),
            NodeTypeSpec {
                label: "Wait".to_string(),
                subtypes: BTreeMap::from([(
                    "time_delay".to_string(),
                    subtype(
                        "Time Delay",
                        vec![field(
                            "delay_minutes",
                            "Delay (minutes)",
                            FieldKind::Number { min: Some(1.0) },
                            true,
                        )],
                    ),
                )]),
            },
        );

        Self { types }
    }

    pub fn subtype(&self, node_type: &str, subtype: &str) -> Option<&SubtypeSpec> {
        self.types.get(node_type)?.subtypes.get(subtype)
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A structural problem in a flow definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowValidationError {
    #[error("flow name must not be empty")]
    EmptyName,

    #[error("flow must have at least one node")]
    NoNodes,

    #[error("duplicate node id: {0}")]
    DuplicateNode(Uuid),

    #[error("node {node_id}: unknown node type '{node_type}'")]
    UnknownType { node_id: Uuid, node_type: String },

    #[error("node {node_id}: subtype '{subtype}' is invalid for type {node_type}")]
    UnknownSubtype {
        node_id: Uuid,
        node_type: String,
        subtype: String,
    },

    #[error("node {node_id}: the {field} field is required for {node_type}/{subtype} nodes")]
    MissingField {
        node_id: Uuid,
        node_type: String,
        subtype: String,
        field: String,
    },

    #[error("node {node_id}: invalid {field}: {reason}")]
    InvalidField {
        node_id: Uuid,
        field: String,
        reason: String,
    },

    #[error("node {node_id}: the field '{field}' is not allowed for {node_type}/{subtype} nodes")]
    UnexpectedField {
        node_id: Uuid,
        node_type: String,
        subtype: String,
        field: String,
    },

    #[error("edge {edge_id} references unknown node {node_id}")]
    DanglingEdge { edge_id: Uuid, node_id: Uuid },

    #[error("edge {0} connects a node to itself")]
    SelfLoop(Uuid),

    #[error("edge {0} is custom but has no condition_value")]
    CustomWithoutValue(Uuid),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Node data keys the editor may always store.
const EDITOR_KEYS: &[&str] = &["label"];

/// Validate structural constraints on a flow.
///
/// Checks:
/// - Name is non-empty and at least one node exists
/// - Node ids are unique
/// - Every node's type/subtype is in the catalog and its data matches the
///   subtype's fields (required, select options, number minimum, no extras)
/// - Edge endpoints exist and differ
/// - `custom` edges carry a `condition_value`
pub fn validate_flow(flow: &Flow, catalog: &NodeCatalog) -> Result<(), FlowValidationError> {
    if flow.name.trim().is_empty() {
        return Err(FlowValidationError::EmptyName);
    }
    if flow.nodes.is_empty() {
        return Err(FlowValidationError::NoNodes);
    }

    let mut ids = HashSet::new();
    for node in &flow.nodes {
        if !ids.insert(node.id) {
            return Err(FlowValidationError::DuplicateNode(node.id));
        }
        validate_node(node, catalog)?;
    }

    for edge in &flow.edges {
        for endpoint in [edge.source_node_id, edge.target_node_id] {
            if !ids.contains(&endpoint) {
                return Err(FlowValidationError::DanglingEdge {
                    edge_id: edge.id,
                    node_id: endpoint,
                });
            }
        }
        if edge.source_node_id == edge.target_node_id {
            return Err(FlowValidationError::SelfLoop(edge.id));
        }
        if edge.condition_type == ConditionType::Custom
            && edge.condition_value.as_ref().is_none_or(is_blank)
        {
            return Err(FlowValidationError::CustomWithoutValue(edge.id));
        }
    }

    Ok(())
}

fn validate_node(node: &Node, catalog: &NodeCatalog) -> Result<(), FlowValidationError> {
    let Some(type_spec) = catalog.types.get(&node.node_type) else {
        return Err(FlowValidationError::UnknownType {
            node_id: node.id,
            node_type: node.node_type.clone(),
        });
    };
    let Some(spec) = type_spec.subtypes.get(&node.subtype) else {
        return Err(FlowValidationError::UnknownSubtype {
            node_id: node.id,
            node_type: node.node_type.clone(),
            subtype: node.subtype.clone(),
        });
    };

    for (name, field) in &spec.fields {
        let value = node.data.get(name).filter(|v| !is_blank(v));
        let Some(value) = value else {
            if field.required {
                return Err(FlowValidationError::MissingField {
                    node_id: node.id,
                    node_type: node.node_type.clone(),
                    subtype: node.subtype.clone(),
                    field: name.clone(),
                });
            }
            continue;
        };
        check_field(node.id, name, field, value)?;
    }

    if let Some(extra) = node
        .data
        .keys()
        .find(|k| !spec.fields.contains_key(*k) && !EDITOR_KEYS.contains(&k.as_str()))
    {
        return Err(FlowValidationError::UnexpectedField {
            node_id: node.id,
            node_type: node.node_type.clone(),
            subtype: node.subtype.clone(),
            field: extra.clone(),
        });
    }

    Ok(())
}

fn check_field(node_id: Uuid, name: &str, field: &FieldSpec, value: &Value) -> Result<(), FlowValidationError> {
    let invalid = |reason: String| FlowValidationError::InvalidField {
        node_id,
        field: name.to_string(),
        reason,
    };

    match &field.kind {
        FieldKind::Text | FieldKind::Textarea => Ok(()),
        FieldKind::Select { options } => {
            let key = value.as_str().unwrap_or_default();
            if options.iter().any(|o| o == key) {
                Ok(())
            } else {
                Err(invalid(format!("'{}' is not one of {}", display(value), options.join(", "))))
            }
        }
        FieldKind::Number { min } => {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            let Some(number) = number else {
                return Err(invalid("must be a number".to_string()));
            };
            match min {
                Some(min) if number < *min => Err(invalid(format!("must be at least {min}"))),
                _ => Ok(()),
            }
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
