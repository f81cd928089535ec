//! Loose value semantics shared by edge conditions and `field_check` nodes.

use serde_json::Value;

/// Truthiness of a JSON value.
///
/// Falsy: `null`, `false`, `0`, `0.0`, `""`, `"0"`, `[]`, `{}`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Loose equality between a contact field and a configured value.
///
/// - `null` equals `null`, `""` and anything falsy
/// - booleans compare against the other side's truthiness
/// - numbers and numeric strings compare numerically
/// - everything else compares by string form
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, other) | (other, Value::Null) => !is_truthy(other) && !is_zero_string(other),
        (Value::Bool(x), other) | (other, Value::Bool(x)) => *x == is_truthy(other),
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match parse_number(s) {
                Some(f) => n.as_f64() == Some(f),
                None => false,
            }
        }
        (Value::String(x), Value::String(y)) => match (parse_number(x), parse_number(y)) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => x == y,
        },
        _ => display(a) == display(b),
    }
}

/// String form used for substring checks and fallback comparisons.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

// "0" is falsy but not equal to null.
fn is_zero_string(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_table() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!("0"), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-2.5), json!("no"), json!("false"), json!([0]), json!({"a": 1})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn loose_equality_numbers_and_strings() {
        assert!(loose_eq(&json!("42"), &json!(42)));
        assert!(loose_eq(&json!(42), &json!("42.0")));
        assert!(loose_eq(&json!("1e1"), &json!("10")));
        assert!(!loose_eq(&json!("abc"), &json!(0)));
        assert!(loose_eq(&json!("Ann"), &json!("Ann")));
        assert!(!loose_eq(&json!("Ann"), &json!("ann")));
    }

    #[test]
    fn loose_equality_null_and_bool() {
        assert!(loose_eq(&json!(null), &json!("")));
        assert!(loose_eq(&json!(null), &json!(false)));
        assert!(!loose_eq(&json!(null), &json!("0")));
        assert!(!loose_eq(&json!(null), &json!("x")));
        assert!(loose_eq(&json!(true), &json!("yes")));
        assert!(loose_eq(&json!(false), &json!("")));
        assert!(!loose_eq(&json!(true), &json!(0)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(display(&json!(null)), "");
        assert_eq!(display(&json!("x")), "x");
        assert_eq!(display(&json!(3)), "3");
    }
}
