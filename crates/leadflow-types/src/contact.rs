//! Contact records that flows run for.
//!
//! A contact is either persisted (form submissions) or transient (manual
//! runs, `id == None`). The engine treats both the same way: it only reads
//! `name`, `email`, `phone`, `id` and any extra fields by name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Database id. `None` for transient contacts.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Any additional submitted fields, addressable by `field_check` nodes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contact {
    /// A contact that only lives inside one execution context.
    pub fn transient(name: impl Into<String>, email: Option<String>, phone: Option<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email,
            phone,
            created_at: None,
            extra: Map::new(),
        }
    }

    /// Look up a field by name. Missing fields are `Value::Null`.
    pub fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.map(|id| Value::String(id.to_string())).unwrap_or(Value::Null),
            "name" => Value::String(self.name.clone()),
            "email" => self.email.clone().map(Value::String).unwrap_or(Value::Null),
            "phone" => self.phone.clone().map(Value::String).unwrap_or(Value::Null),
            other => self.extra.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    /// Email address, if present and non-blank.
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.trim().is_empty())
    }

    /// Phone number, if present and non-blank.
    pub fn phone_number(&self) -> Option<&str> {
        self.phone.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// A raw contact form submission, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}
