//! Profile (people) operations.
//!
//! A profile update is sent as a single operation map:
//!
//! ```text
//! { "$token": .., "$distinct_id": .., "$set": { .. } }
//! ```
//!
//! Identity fields are lifted out of the caller's properties into the `$`
//! keys, and whatever remains becomes the operation payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::properties::{is_falsy, properties_map, Properties};
use super::DeliveryOptions;
use crate::error::{Error, Result};

/// Profile update verbs understood by the engage endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileOperation {
    Set,
    SetOnce,
    Add,
    Append,
    Union,
    Unset,
    Delete,
    TrackCharge,
}

impl ProfileOperation {
    pub const ALL: [ProfileOperation; 8] = [
        ProfileOperation::Set,
        ProfileOperation::SetOnce,
        ProfileOperation::Add,
        ProfileOperation::Append,
        ProfileOperation::Union,
        ProfileOperation::Unset,
        ProfileOperation::Delete,
        ProfileOperation::TrackCharge,
    ];

    /// Name used by callers
    pub fn name(&self) -> &'static str {
        match self {
            ProfileOperation::Set => "set",
            ProfileOperation::SetOnce => "set_once",
            ProfileOperation::Add => "add",
            ProfileOperation::Append => "append",
            ProfileOperation::Union => "union",
            ProfileOperation::Unset => "unset",
            ProfileOperation::Delete => "delete",
            ProfileOperation::TrackCharge => "track_charge",
        }
    }

    /// Operation key in the wire format
    pub fn api_key(&self) -> &'static str {
        match self {
            ProfileOperation::Set => "$set",
            ProfileOperation::SetOnce => "$set_once",
            ProfileOperation::Add => "$add",
            ProfileOperation::Append | ProfileOperation::TrackCharge => "$append",
            ProfileOperation::Union => "$union",
            ProfileOperation::Unset => "$unset",
            ProfileOperation::Delete => "$delete",
        }
    }
}

impl fmt::Display for ProfileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ProfileOperation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = ProfileOperation::ALL.iter().map(|op| op.name()).collect();
                Error::InvalidOperation(format!("{:?} (expected one of: {})", s, known.join(", ")))
            })
    }
}

/// Current UTC time in the ISO-8601 form used for charge timestamps
pub fn charge_timestamp() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Build the operation map for a profile update.
///
/// `payload` is a properties object for every operation except `unset`,
/// which takes a list of property names.
pub fn build_operation(
    operation: ProfileOperation,
    payload: Option<&Value>,
    options: &DeliveryOptions,
    default_token: &str,
) -> Result<Properties> {
    let (mut properties, unset_list) = match operation {
        ProfileOperation::Unset => (Properties::new(), Some(unset_names(payload)?)),
        _ => (properties_map(payload)?, None),
    };

    let distinct_id = resolve_distinct_id(&mut properties, options.distinct_id.as_deref())?;
    let token = match properties.remove("token") {
        Some(token) if !is_falsy(&token) => token,
        _ => Value::String(
            options
                .token
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(default_token)
                .to_string(),
        ),
    };

    let mut params = Properties::new();
    params.insert("$token".to_string(), token);
    params.insert("$distinct_id".to_string(), distinct_id);
    if let Some(ignore_time) = options.ignore_time {
        params.insert("$ignore_time".to_string(), Value::Bool(ignore_time));
    }
    if let Some(ip) = &options.ip {
        params.insert("$ip".to_string(), Value::String(ip.clone()));
    }

    let op_payload = match operation {
        ProfileOperation::TrackCharge => {
            if !properties.contains_key("$time") {
                let time = options
                    .time
                    .clone()
                    .unwrap_or_else(|| Value::String(charge_timestamp()));
                properties.insert("$time".to_string(), time);
            }

            let amount = properties
                .remove("amount")
                .or_else(|| options.amount.clone())
                .ok_or_else(|| {
                    Error::InvalidInput("track_charge requires an 'amount'".to_string())
                })?;
            properties.insert("$amount".to_string(), amount);

            let mut transaction = Properties::new();
            transaction.insert("$transactions".to_string(), Value::Object(properties));
            Value::Object(transaction)
        }
        ProfileOperation::Unset => Value::Array(unset_list.unwrap_or_default()),
        _ => {
            if let Some(time) = &options.time {
                params.insert("$time".to_string(), time.clone());
            }
            Value::Object(properties)
        }
    };

    params.insert(operation.api_key().to_string(), op_payload);
    Ok(params)
}

fn unset_names(payload: Option<&Value>) -> Result<Vec<Value>> {
    match payload {
        Some(Value::Array(names)) if names.iter().all(Value::is_string) => Ok(names.clone()),
        _ => Err(Error::InvalidUnsetPayload),
    }
}

/// Pull `distinct_id` out of the properties, reconciling it with the override.
fn resolve_distinct_id(properties: &mut Properties, option: Option<&str>) -> Result<Value> {
    match (properties.remove("distinct_id"), option) {
        (Some(Value::Null), None) | (None, None) => Err(Error::InvalidInput(
            "a 'distinct_id' is required for profile operations".to_string(),
        )),
        (Some(Value::Null), Some(id)) | (None, Some(id)) => Ok(Value::String(id.to_string())),
        (Some(from_props), None) => Ok(from_props),
        (Some(from_props), Some(id)) => {
            if from_props.as_str() == Some(id) {
                Ok(from_props)
            } else {
                Err(Error::InvalidInput(format!(
                    "conflicting distinct_id: {} in properties, {:?} given separately",
                    from_props, id
                )))
            }
        }
    }
}
