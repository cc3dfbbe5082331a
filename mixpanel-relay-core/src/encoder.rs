//! Wire encoding for the tracking API
//!
//! The envelope is serialized to JSON, base64-encoded and carried in a single
//! query parameter:
//!
//! ```text
//! GET /track/?data=<base64(json)>&test=1
//! ```
//!
//! Property maps keep their keys sorted, so encoding the same envelope twice
//! yields identical bytes.

use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::Properties;

/// Base64 engine for the data parameter.
const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// What gets serialized for one delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// `{"event": .., "properties": {..}}` for standard and funnel events
    Event { event: String, properties: Properties },
    /// Profile operations are sent as the bare operation map
    Profile(Properties),
}

/// Encoded envelope plus the test-mode flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// base64 of the envelope's JSON text
    pub data: String,
    /// Whether the test marker is sent
    pub test: bool,
}

impl EncodedPayload {
    /// Render the query string, omitting the test parameter when not in test mode
    pub fn query_string(&self, data_variable: &str, test_variable: &str) -> String {
        let mut query = format!(
            "{}={}",
            urlencoding::encode(data_variable),
            urlencoding::encode(&self.data)
        );
        if self.test {
            query.push_str(&format!("&{}=1", urlencoding::encode(test_variable)));
        }
        query
    }
}

/// Encode an envelope for transmission
pub fn encode(envelope: &Envelope, test: bool) -> Result<EncodedPayload> {
    let json = serde_json::to_vec(envelope)?;
    Ok(EncodedPayload {
        data: BASE64.encode(json),
        test,
    })
}

/// Reverse [`encode`]: base64 text back to the JSON envelope
pub fn decode(data: &str) -> Result<Value> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| Error::InvalidInput(format!("payload is not valid base64: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn event_envelope() -> Envelope {
        Envelope::Event {
            event: "event_foo".to_string(),
            properties: props(json!({"token": "tok", "foo": "bar", "n": 3})),
        }
    }

    #[test]
    fn test_decode_recovers_envelope() {
        let encoded = encode(&event_envelope(), false).unwrap();
        assert_eq!(
            decode(&encoded.data).unwrap(),
            json!({"event": "event_foo", "properties": {"token": "tok", "foo": "bar", "n": 3}})
        );
    }

    #[test]
    fn test_profile_envelope_is_unwrapped() {
        let envelope = Envelope::Profile(props(json!({"$token": "tok", "$unset": ["a"]})));
        let encoded = encode(&envelope, false).unwrap();
        assert_eq!(
            decode(&encoded.data).unwrap(),
            json!({"$token": "tok", "$unset": ["a"]})
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode(&event_envelope(), true).unwrap();
        let b = encode(&event_envelope(), true).unwrap();
        assert_eq!(a, b);

        // insertion order does not leak into the bytes
        let mut reversed = Properties::new();
        reversed.insert("n".to_string(), json!(3));
        reversed.insert("foo".to_string(), json!("bar"));
        reversed.insert("token".to_string(), json!("tok"));
        let c = encode(
            &Envelope::Event {
                event: "event_foo".to_string(),
                properties: reversed,
            },
            true,
        )
        .unwrap();
        assert_eq!(a.data, c.data);
    }

    #[test]
    fn test_query_string_with_test_flag() {
        let encoded = EncodedPayload {
            data: "ab+c/d==".to_string(),
            test: true,
        };
        assert_eq!(
            encoded.query_string("data", "test"),
            "data=ab%2Bc%2Fd%3D%3D&test=1"
        );
    }

    #[test]
    fn test_query_string_without_test_flag() {
        let encoded = encode(&event_envelope(), false).unwrap();
        let query = encoded.query_string("payload", "test");
        assert!(query.starts_with("payload="));
        assert!(!query.contains("test="));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not base64!"), Err(Error::InvalidInput(_))));
        let not_json = BASE64.encode(b"{nope");
        assert!(matches!(decode(&not_json), Err(Error::Encoding(_))));
    }
}
