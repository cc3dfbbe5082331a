//! Error types for mixpanel-relay-core

use thiserror::Error;

/// A delivery failure worth retrying.
///
/// Produced by the transport for socket-level errors and for any response
/// that is not `200 OK`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransientError {
    /// Connection refused, timed out, reset, or the body could not be read
    #[error("the tracking request failed with a socket error: {0}")]
    Socket(String),

    /// The server answered with something other than `200 OK`
    #[error("the tracking request failed with status {status} ({reason})")]
    Http { status: u16, reason: String },
}

/// Main error type for the mixpanel-relay-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Caller passed arguments that can never be delivered
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Funnel event without a `distinct_id`
    #[error("invalid funnel properties: {0}")]
    InvalidFunnelProperties(String),

    /// Unknown profile operation name
    #[error("invalid profile operation: {0}")]
    InvalidOperation(String),

    /// `unset` called with something other than a list of property names
    #[error("unset payload must be a list of property names")]
    InvalidUnsetPayload,

    /// Envelope could not be serialized
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Every attempt failed; carries the last cause
    #[error("delivery failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransientError },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The retry queue refused a job
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Result type alias for mixpanel-relay-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_names_attempts_and_cause() {
        let err = Error::Exhausted {
            attempts: 3,
            last: TransientError::Socket("connection reset".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("delivery failed after 3 attempts"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_http_error_message_carries_status_and_reason() {
        let err = TransientError::Http {
            status: 502,
            reason: "Bad Gateway".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("Bad Gateway"));
    }
}
