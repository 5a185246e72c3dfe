use serde_json::Value;

/// One record under validation: field name to raw value.
pub type Record = serde_json::Map<String, Value>;

/// Whether a value counts as "empty": absent, null, an empty string or an
/// empty list. Non-implicit rules are skipped for empty values.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

/// Render a scalar the way it is compared against stored data.
///
/// Returns `None` for null, arrays and objects.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Loose equality used by `same`, `different`, `confirmed`, `in`.
///
/// `"5"` equals `5`; arrays and objects compare structurally.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (scalar_to_string(a), scalar_to_string(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}
