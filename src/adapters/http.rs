// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! reqwest-backed [`Transport`].

use std::time::Duration;
use async_trait::async_trait;
use tracing::debug;

use super::{AdapterError, Transport};

const USER_AGENT: &str = concat!("submission-sync/", env!("CARGO_PKG_VERSION"));

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AdapterError::Permanent(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

/// 429 and 5xx are worth retrying; any other non-success is not.
pub(crate) fn classify_status(status: u16, body: &[u8]) -> AdapterError {
    let snippet: String = String::from_utf8_lossy(body).chars().take(200).collect();
    let message = format!("HTTP {}: {}", status, snippet);
    if status == 429 || (500..600).contains(&status) {
        AdapterError::Transient(message)
    } else {
        AdapterError::Permanent(message)
    }
}

fn classify_request_error(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        AdapterError::Transient(err.to_string())
    } else {
        AdapterError::Permanent(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, AdapterError> {
        let response = self.client.get(url).send().await.map_err(classify_request_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify_request_error)?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "HTTP fetch complete");

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(classify_status(status.as_u16(), &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(429, b"slow down").is_transient());
        assert!(classify_status(503, b"").is_transient());
        assert!(!classify_status(400, b"{\"status\":\"FAILED\"}").is_transient());
        assert!(!classify_status(404, b"").is_transient());
    }

    #[test]
    fn test_status_message_is_truncated() {
        let body = vec![b'x'; 1000];
        match classify_status(500, &body) {
            AdapterError::Transient(msg) => assert!(msg.len() < 260),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_client_builds() {
        assert!(HttpTransport::new(Duration::from_secs(5)).is_ok());
    }
}
