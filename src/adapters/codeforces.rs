// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Codeforces `user.status` API adapter.
//!
//! The API pages newest-first through `from`/`count`. Paging stops at the
//! first record at or below the watermark, or at a short page.
//!
//! Submissions still being judged (no verdict, or `TESTING`) are skipped.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

use crate::platform::Platform;
use crate::submission::{SubmissionRecord, Timestamp};
use super::{decode, endpoint, validate_handle, AdapterError, PlatformAdapter, Transport, MAX_PAGES};

pub const DEFAULT_BASE_URL: &str = "https://codeforces.com";

/// Contest ids at or above this are gym contests.
const GYM_CONTEST_ID: i64 = 100_000;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSubmission {
    creation_time_seconds: i64,
    problem: ApiProblem,
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    programming_language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProblem {
    contest_id: i64,
    index: String,
    name: String,
    #[serde(default)]
    points: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Map Codeforces verdict names to the short codes used across platforms.
#[must_use]
pub fn normalize_verdict(verdict: &str) -> String {
    match verdict {
        "OK" => "AC",
        "WRONG_ANSWER" => "WA",
        "TIME_LIMIT_EXCEEDED" => "TLE",
        "MEMORY_LIMIT_EXCEEDED" => "MLE",
        "RUNTIME_ERROR" => "RE",
        "COMPILATION_ERROR" => "CE",
        other => other,
    }
    .to_string()
}

fn problem_url(base_url: &str, problem: &ApiProblem) -> String {
    if problem.contest_id >= GYM_CONTEST_ID {
        format!("{}/gym/{}/problem/{}", base_url, problem.contest_id, problem.index)
    } else {
        format!("{}/problemset/problem/{}/{}", base_url, problem.contest_id, problem.index)
    }
}

/// Parse one `user.status` page into canonical records (judged only), in API order.
pub fn parse_user_status(base_url: &str, body: &[u8]) -> Result<Vec<SubmissionRecord>, AdapterError> {
    parse_page(base_url, body).map(|(_, records)| records)
}

/// Like [`parse_user_status`], also returning the raw page length.
fn parse_page(base_url: &str, body: &[u8]) -> Result<(usize, Vec<SubmissionRecord>), AdapterError> {
    let envelope: Envelope<Vec<ApiSubmission>> = decode(Platform::Codeforces, body)?;
    if envelope.status != "OK" {
        return Err(AdapterError::Permanent(format!(
            "codeforces API returned {}: {}",
            envelope.status,
            envelope.comment.unwrap_or_default()
        )));
    }
    let submissions = envelope
        .result
        .ok_or_else(|| AdapterError::Permanent("codeforces API returned OK without a result".into()))?;

    let raw_len = submissions.len();
    let mut records = Vec::with_capacity(raw_len);
    for sub in submissions {
        let verdict = match sub.verdict.as_deref() {
            None | Some("TESTING") => continue,
            Some(v) => normalize_verdict(v),
        };
        let creation_time = DateTime::from_timestamp(sub.creation_time_seconds, 0).ok_or_else(|| {
            AdapterError::Permanent(format!("creationTimeSeconds out of range: {}", sub.creation_time_seconds))
        })?;
        let mut record = SubmissionRecord::new(
            sub.problem.name.clone(),
            problem_url(base_url, &sub.problem),
            creation_time,
            verdict,
        )
        .with_points(sub.problem.points.unwrap_or(0.0))
        .with_tags(sub.problem.tags);
        if let Some(language) = sub.programming_language {
            record = record.with_language(language);
        }
        records.push(record);
    }
    Ok((raw_len, records))
}

pub struct CodeforcesAdapter<T: Transport> {
    transport: T,
    base_url: String,
    page_size: usize,
}

impl<T: Transport> CodeforcesAdapter<T> {
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

    fn page_url(&self, handle: &str, from: usize) -> Result<String, AdapterError> {
        let (from, count) = (from.to_string(), self.page_size.to_string());
        endpoint(
            Platform::Codeforces,
            &self.base_url,
            &["api", "user.status"],
            &[("handle", handle), ("from", from.as_str()), ("count", count.as_str())],
        )
    }
}

#[async_trait]
impl<T: Transport> PlatformAdapter for CodeforcesAdapter<T> {
    async fn fetch(&self, handle: &str, since: Option<Timestamp>) -> Result<Vec<SubmissionRecord>, AdapterError> {
        let handle = validate_handle(handle)?;
        let mut fresh = Vec::new();
        let mut from = 1;

        for _ in 0..MAX_PAGES {
            let body = self.transport.get(&self.page_url(handle, from)?).await?;
            let (page_len, page) = parse_page(&self.base_url, &body)?;

            let mut reached_watermark = false;
            for record in page {
                if since.is_some_and(|s| record.creation_time <= s) {
                    reached_watermark = true;
                    break;
                }
                fresh.push(record);
            }

            if reached_watermark || page_len < self.page_size {
                break;
            }
            from += self.page_size;
        }

        debug!(handle, fetched = fresh.len(), "Codeforces fetch complete");
        Ok(fresh)
    }
}
