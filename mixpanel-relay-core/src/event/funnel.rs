//! Funnel step shaping.

use serde_json::Value;

use super::properties::Properties;
use crate::error::{Error, Result};

/// Add `funnel`, `step` and `goal` to a funnel event's properties.
///
/// Funnels always follow one user, so `distinct_id` must already be present.
pub fn add_funnel_properties(
    mut properties: Properties,
    funnel: &str,
    step: &Value,
    goal: &str,
) -> Result<Properties> {
    if properties.get("distinct_id").map_or(true, Value::is_null) {
        return Err(Error::InvalidFunnelProperties(
            "a 'distinct_id' must be given to record a funnel event".to_string(),
        ));
    }

    properties.insert("funnel".to_string(), Value::String(funnel.to_string()));
    properties.insert("step".to_string(), step.clone());
    properties.insert("goal".to_string(), Value::String(goal.to_string()));

    Ok(properties)
}
