//! `{{ placeholder }}` expansion for message templates.

use std::sync::LazyLock;

use leadflow_types::contact::Contact;
use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(email|name|phone)\s*\}\}").expect("placeholder pattern is valid")
});

/// Replace `{{name}}`, `{{email}}` and `{{phone}}` with the contact's fields.
///
/// Absent fields expand to the empty string. Any other `{{...}}` is kept verbatim.
pub fn interpolate(template: &str, contact: &Contact) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "name" => contact.name.clone(),
            "email" => contact.email.clone().unwrap_or_default(),
            "phone" => contact.phone.clone().unwrap_or_default(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}
