//! HTTP transport for the tracking API
//!
//! One call is one GET round-trip. Retrying is the delivery task's job.

use std::future::Future;
use std::time::Duration;

use hyper::ext::ReasonPhrase;
use reqwest::StatusCode;

use crate::config::ApiConfig;
use crate::error::{Error, Result, TransientError};

/// Sends an encoded query to an endpoint and reports whether it was recorded.
///
/// `Ok(true)` means the server answered `200 OK` with body `1`; `Ok(false)`
/// means `200 OK` with any other body.
pub trait Transport {
    fn send(
        &self,
        endpoint: &str,
        query: &str,
    ) -> impl Future<Output = std::result::Result<bool, TransientError>> + Send;
}

/// [`Transport`] backed by `reqwest`
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the configured server.
    ///
    /// Idle connections are not pooled, so every request's connection is
    /// closed once its response has been read or dropped.
    pub fn new(api: &ApiConfig, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: api.base_url(),
        })
    }

    /// Full request URL for an endpoint and query
    pub fn url(&self, endpoint: &str, query: &str) -> String {
        format!("{}{}?{}", self.base_url, endpoint, query)
    }
}

impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, query: &str) -> std::result::Result<bool, TransientError> {
        let url = self.url(endpoint, query);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransientError::Socket(e.to_string()))?;

        check_status(response.status(), &reason_phrase(&response))?;

        let body = response
            .text()
            .await
            .map_err(|e| TransientError::Socket(e.to_string()))?;

        Ok(body == "1")
    }
}

/// Reason phrase as sent by the server.
///
/// hyper only keeps the phrase when it differs from the canonical one.
fn reason_phrase(response: &reqwest::Response) -> String {
    match response.extensions().get::<ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string(),
    }
}

/// Only `200 OK` counts as an accepted request.
fn check_status(status: StatusCode, reason: &str) -> std::result::Result<(), TransientError> {
    if status == StatusCode::OK && reason == "OK" {
        Ok(())
    } else {
        Err(TransientError::Http {
            status: status.as_u16(),
            reason: reason.to_string(),
        })
    }
}
