//! Dynamic values exchanged between server state and client views.
//!
//! Every synchronized value is a `serde_json::Value`; a batch of property
//! updates is an insertion-ordered [`Changes`] map.

pub use serde_json::Value;

use crate::utils::html;

/// Ordered property → value map used for batched updates.
pub type Changes = serde_json::Map<String, Value>;

/// Structural equality with numeric tolerance: `1` and `1.0` are equal.
pub fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_match(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_match(v, w)))
        }
        _ => a == b,
    }
}

/// Escape top-level string values before they reach a client container.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => match html::escape(&s) {
            std::borrow::Cow::Borrowed(_) => Value::String(s),
            std::borrow::Cow::Owned(escaped) => Value::String(escaped),
        },
        other => other,
    }
}

/// Short human-readable name of a value's JSON type.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
