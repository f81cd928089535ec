//! Human-readable step labels recorded in step input.

use leadflow_types::flow::{FIELD_CHECK, Node, NodeType, SEND_EMAIL, SEND_SMS, TIME_DELAY};
use serde_json::Value;

/// Derive the display label of a node.
pub fn step_label(node: &Node) -> String {
    let Ok(node_type) = node.parsed_type() else {
        return format!("{} Node", ucfirst(&node.node_type));
    };

    match node_type {
        NodeType::Trigger => "Form Submit Trigger".to_string(),
        NodeType::Action => match node.subtype.as_str() {
            SEND_EMAIL => "Send Email".to_string(),
            SEND_SMS => "Send SMS".to_string(),
            other => format!("Action: {}", humanize(other)),
        },
        NodeType::Condition => match node.subtype.as_str() {
            FIELD_CHECK => {
                let field = match node.data.get("field_name") {
                    Some(Value::String(name)) => name.as_str(),
                    _ => "unknown field",
                };
                format!("Check {}", humanize(field))
            }
            other => format!("Condition: {}", humanize(other)),
        },
        NodeType::Wait => match node.subtype.as_str() {
            TIME_DELAY => {
                let minutes = node.delay_minutes();
                let plural = if minutes > 1 { "s" } else { "" };
                format!("Wait {minutes} minute{plural}")
            }
            other => format!("Wait: {}", humanize(other)),
        },
    }
}

/// `"field_name"` -> `"Field name"`.
fn humanize(raw: &str) -> String {
    ucfirst(&raw.replace('_', " "))
}

/// Uppercase the first character only.
fn ucfirst(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
