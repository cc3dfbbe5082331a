//! Event families and their property shaping
//!
//! Every delivery belongs to one family:
//! - **Standard**: a named event with free-form properties
//! - **Funnel**: a standard event under the configured funnel event name,
//!   tagged with `funnel`, `step` and `goal`
//! - **Profile**: a people operation sent to the engage endpoint
//!
//! Shaping is a pure function of the family, the caller's properties, the
//! per-call options and the API config, so a retried job rebuilds the exact
//! same envelope.

mod funnel;
mod profile;
mod properties;

pub use funnel::add_funnel_properties;
pub use profile::{build_operation, charge_timestamp, ProfileOperation};
pub use properties::{build_properties, properties_map, Properties};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ApiConfig;
use crate::encoder::Envelope;
use crate::error::Result;

/// Per-call overrides
///
/// Unset fields fall back to the configuration or to values found in the
/// properties themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Token to use when the properties carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Test-mode override; `None` uses `api.test_mode`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,

    /// User the event or profile update belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_id: Option<String>,

    /// Charge amount for `track_charge` when not in the properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,

    /// Profile `$time`, or the transaction time for `track_charge`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Value>,

    /// Profile `$ignore_time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_time: Option<bool>,

    /// Profile `$ip`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// What kind of delivery a job is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum EventFamily {
    Standard {
        event: String,
    },
    Funnel {
        funnel: String,
        step: Value,
        goal: String,
    },
    Profile {
        operation: ProfileOperation,
    },
}

impl EventFamily {
    /// Short human-readable name for logs
    pub fn label(&self) -> String {
        match self {
            EventFamily::Standard { event } => event.clone(),
            EventFamily::Funnel { funnel, step, .. } => match step.as_str() {
                Some(step) => format!("{}-{}", funnel, step),
                None => format!("{}-{}", funnel, step),
            },
            EventFamily::Profile { operation } => format!("people:{}", operation),
        }
    }

    /// Endpoint path this family is sent to
    pub fn endpoint<'a>(&self, api: &'a ApiConfig) -> &'a str {
        match self {
            EventFamily::Standard { .. } | EventFamily::Funnel { .. } => &api.tracking_endpoint,
            EventFamily::Profile { .. } => &api.people_endpoint,
        }
    }

    /// Shape the caller's properties into the envelope for this family.
    pub fn build(
        &self,
        properties: Option<&Value>,
        options: &DeliveryOptions,
        api: &ApiConfig,
    ) -> Result<Envelope> {
        match self {
            EventFamily::Standard { event } => {
                let properties = event_properties(properties, options, api)?;
                Ok(Envelope::Event {
                    event: event.clone(),
                    properties,
                })
            }
            EventFamily::Funnel { funnel, step, goal } => {
                let properties = event_properties(properties, options, api)?;
                let properties = add_funnel_properties(properties, funnel, step, goal)?;
                Ok(Envelope::Event {
                    event: api.funnel_event_id.clone(),
                    properties,
                })
            }
            EventFamily::Profile { operation } => Ok(Envelope::Profile(build_operation(
                *operation,
                properties,
                options,
                &api.token,
            )?)),
        }
    }
}

/// Properties for the tracking endpoint, with token and `distinct_id` filled in.
fn event_properties(
    properties: Option<&Value>,
    options: &DeliveryOptions,
    api: &ApiConfig,
) -> Result<Properties> {
    let mut properties = build_properties(properties, options.token.as_deref(), &api.token)?;
    if let Some(distinct_id) = &options.distinct_id {
        properties
            .entry("distinct_id")
            .or_insert_with(|| Value::String(distinct_id.clone()));
    }
    Ok(properties)
}
