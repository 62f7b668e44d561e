// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Platform adapters.
//!
//! An adapter turns `(handle, watermark)` into the platform's new records,
//! normalized to [`SubmissionRecord`]. Contract:
//!
//! - the returned list is ordered newest first;
//! - every record is strictly newer than `since` (when given);
//! - network I/O, pagination and wire-format parsing stay inside the adapter.
//!
//! Failures are classified: [`AdapterError::Transient`] (network, timeout,
//! throttling, 5xx) may be retried; [`AdapterError::Permanent`] (unknown
//! handle, schema mismatch) must not be.
//!
//! Adapters are registered per [`Platform`] in an [`AdapterRegistry`] that is
//! frozen once built. Jobs carry only the platform tag.

pub mod http;
pub mod codeforces;
pub mod hackerrank;

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::platform::Platform;
use crate::submission::{SubmissionRecord, Timestamp};

pub use codeforces::CodeforcesAdapter;
pub use hackerrank::HackerrankAdapter;
pub use http::HttpTransport;

/// Upper bound on pages walked by one fetch.
pub(crate) const MAX_PAGES: usize = 500;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Worth retrying with backoff.
    #[error("transient: {0}")]
    Transient(String),
    /// Retrying cannot help.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl AdapterError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    async fn fetch(&self, handle: &str, since: Option<Timestamp>) -> Result<Vec<SubmissionRecord>, AdapterError>;
}

/// Raw byte transport used by the HTTP-backed adapters.
///
/// Implementations return the body of a 2xx response and classify
/// everything else.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, AdapterError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, url: &str) -> Result<Vec<u8>, AdapterError> {
        (**self).get(url).await
    }
}

/// Decode a typed payload, failing permanently on any schema mismatch.
pub(crate) fn decode<T: DeserializeOwned>(platform: Platform, body: &[u8]) -> Result<T, AdapterError> {
    serde_json::from_slice(body)
        .map_err(|e| AdapterError::Permanent(format!("{} payload did not match schema: {}", platform, e)))
}

/// Build `base_url/<segments...>?<query>` with every part percent-encoded.
pub(crate) fn endpoint(
    platform: Platform,
    base_url: &str,
    segments: &[&str],
    query: &[(&str, &str)],
) -> Result<String, AdapterError> {
    let invalid = |detail: String| AdapterError::Permanent(format!("{} base URL {}: {}", platform, base_url, detail));
    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url.into())
}

/// Reject handles that cannot be placed in a URL path or query verbatim.
pub(crate) fn validate_handle(handle: &str) -> Result<&str, AdapterError> {
    let ok = !handle.is_empty()
        && handle.len() <= 64
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(handle)
    } else {
        Err(AdapterError::Permanent(format!("invalid handle: '{}'", handle)))
    }
}

/// Closed lookup table from platform tag to adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for `platform`.
    #[must_use]
    pub fn with(mut self, platform: Platform, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(platform, adapter);
        self
    }

    /// Registry with the JSON-API platforms wired to `transport`.
    ///
    /// CodeChef and SPOJ only expose HTML; register adapters for them with
    /// [`with`](Self::with).
    pub fn with_http_defaults(transport: Arc<dyn Transport>, page_size: usize) -> Self {
        Self::new()
            .with(
                Platform::Codeforces,
                Arc::new(CodeforcesAdapter::new(transport.clone()).with_page_size(page_size)),
            )
            .with(
                Platform::Hackerrank,
                Arc::new(HackerrankAdapter::new(transport).with_page_size(page_size)),
            )
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    #[must_use]
    pub fn supports(&self, platform: Platform) -> bool {
        self.adapters.contains_key(&platform)
    }

    /// Registered platforms, in [`Platform::ALL`] order.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL.into_iter().filter(|p| self.supports(*p)).collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use parking_lot::Mutex;
    use super::*;

    /// Canned responses keyed by URL; records every request.
    #[derive(Default)]
    pub struct CannedTransport {
        responses: HashMap<String, Result<Vec<u8>, AdapterError>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl CannedTransport {
        pub fn with(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), Ok(body.as_bytes().to_vec()));
            self
        }

        pub fn with_error(mut self, url: &str, err: AdapterError) -> Self {
            self.responses.insert(url.to_string(), Err(err));
            self
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn get(&self, url: &str) -> Result<Vec<u8>, AdapterError> {
            self.requests.lock().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(AdapterError::Permanent(format!("unexpected url {}", url))))
        }
    }
}
