//! Property builder shared by every event family.

use serde_json::Value;

use crate::error::{Error, Result};

/// Free-form event properties, serialized with sorted keys.
pub type Properties = serde_json::Map<String, Value>;

/// Returns true for values the remote API treats as "not set".
pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Copy caller properties into a fresh map.
///
/// `None` and `null` both mean "no properties". Anything other than a JSON
/// object is rejected.
pub fn properties_map(properties: Option<&Value>) -> Result<Properties> {
    match properties {
        None | Some(Value::Null) => Ok(Properties::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(Error::InvalidInput(format!(
            "properties must be a JSON object, got {}",
            json_kind(other)
        ))),
    }
}

/// Build the complete properties map for an event.
///
/// A non-empty `token` already present in `properties` always wins. Otherwise
/// the override is used when given, then `default_token`.
pub fn build_properties(
    properties: Option<&Value>,
    token: Option<&str>,
    default_token: &str,
) -> Result<Properties> {
    let mut map = properties_map(properties)?;

    if map.get("token").map_or(true, is_falsy) {
        let token = token.filter(|t| !t.is_empty()).unwrap_or(default_token);
        map.insert("token".to_string(), Value::String(token.to_string()));
    }

    Ok(map)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
