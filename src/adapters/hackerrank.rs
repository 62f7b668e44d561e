// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HackerRank `recent_challenges` adapter.
//!
//! The endpoint only lists solved challenges, so every record is `AC`.
//! Pages are linked by an opaque cursor; a missing cursor or `last_page`
//! ends the walk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::platform::Platform;
use crate::submission::{SubmissionRecord, Timestamp};
use super::{decode, endpoint, validate_handle, AdapterError, PlatformAdapter, Transport, MAX_PAGES};

pub const DEFAULT_BASE_URL: &str = "https://www.hackerrank.com";

const SOLVED: &str = "AC";

#[derive(Debug, Deserialize)]
struct RecentChallenges {
    models: Vec<Challenge>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default = "default_last_page")]
    last_page: bool,
}

fn default_last_page() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Challenge {
    name: String,
    url: String,
    created_at: String,
}

fn parse_created_at(raw: &str) -> Result<Timestamp, AdapterError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AdapterError::Permanent(format!("bad created_at '{}': {}", raw, e)))
}

pub struct HackerrankAdapter<T: Transport> {
    transport: T,
    base_url: String,
    page_size: usize,
}

impl<T: Transport> HackerrankAdapter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 100,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn page_url(&self, handle: &str, cursor: Option<&str>) -> Result<String, AdapterError> {
        let limit = self.page_size.to_string();
        let mut query = vec![("limit", limit.as_str()), ("response_version", "v2")];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        endpoint(
            Platform::Hackerrank,
            &self.base_url,
            &["rest", "hackers", handle, "recent_challenges"],
            &query,
        )
    }
}

fn to_record(base_url: &str, challenge: Challenge) -> Result<SubmissionRecord, AdapterError> {
    let creation_time = parse_created_at(&challenge.created_at)?;
    let url = if challenge.url.starts_with("http") {
        challenge.url
    } else {
        format!("{}/{}", base_url, challenge.url.trim_start_matches('/'))
    };
    Ok(SubmissionRecord::new(challenge.name, url, creation_time, SOLVED))
}

/// Parse one `recent_challenges` page into records (page order) and the
/// cursor of the next page, `None` on the last one.
pub fn parse_recent_challenges(
    base_url: &str,
    body: &[u8],
) -> Result<(Vec<SubmissionRecord>, Option<String>), AdapterError> {
    let page: RecentChallenges = decode(Platform::Hackerrank, body)?;
    let last_page = page.last_page;
    let records = page
        .models
        .into_iter()
        .map(|challenge| to_record(base_url, challenge))
        .collect::<Result<Vec<_>, _>>()?;
    let next = page.cursor.filter(|c| !last_page && !c.is_empty());
    Ok((records, next))
}

#[async_trait]
impl<T: Transport> PlatformAdapter for HackerrankAdapter<T> {
    async fn fetch(&self, handle: &str, since: Option<Timestamp>) -> Result<Vec<SubmissionRecord>, AdapterError> {
        let handle = validate_handle(handle)?;
        let mut fresh = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let body = self.transport.get(&self.page_url(handle, cursor.as_deref())?).await?;
            let (records, next) = parse_recent_challenges(&self.base_url, &body)?;

            for record in records {
                if since.is_some_and(|s| record.creation_time <= s) {
                    debug!(handle, fetched = fresh.len(), "HackerRank fetch reached watermark");
                    return Ok(fresh);
                }
                fresh.push(record);
            }

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(handle, fetched = fresh.len(), "HackerRank fetch complete");
        Ok(fresh)
    }
}
