// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read-side queries over stored submissions.
//!
//! These share the storage contract with the merge path and go through the
//! same [`ResourcePool`], so reads are gated by the same permit budget.
//!
//! A missing user is the only error; a platform or status with no matches
//! yields an empty list.

use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SyncError;
use crate::platform::Platform;
use crate::pool::ResourcePool;
use crate::submission::{SubmissionRecord, Timestamp};
use crate::user::UserId;

/// Filter applied to one platform's stored list.
///
/// Both criteria are optional. `status` is an exact match; `tag` requires the
/// record's tag list to contain that exact tag.
///
/// # Example
///
/// ```
/// use submission_sync::SubmissionFilter;
///
/// let filter = SubmissionFilter::status("AC").with_tag("dp");
/// assert_eq!(filter.status.as_deref(), Some("AC"));
/// assert_eq!(filter.tag.as_deref(), Some("dp"));
/// assert!(SubmissionFilter::default().is_unrestricted());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl SubmissionFilter {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            tag: None,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Build from raw query parameters, treating empty strings as absent.
    pub fn from_params(status: Option<&str>, tag: Option<&str>) -> Self {
        let keep = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            status: keep(status),
            tag: keep(tag),
        }
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.status.is_none() && self.tag.is_none()
    }

    #[must_use]
    pub fn matches(&self, record: &SubmissionRecord) -> bool {
        let status_ok = self.status.as_deref().map_or(true, |s| record.status == s);
        let tag_ok = self.tag.as_deref().map_or(true, |t| record.has_tag(t));
        status_ok && tag_ok
    }
}

/// One entry of the cross-platform feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub platform: Platform,
    #[serde(flatten)]
    pub record: SubmissionRecord,
}

/// Pool-gated read access to stored submissions.
#[derive(Clone)]
pub struct SubmissionQuery {
    pool: Arc<ResourcePool>,
    page_size: usize,
}

impl SubmissionQuery {
    pub fn new(pool: Arc<ResourcePool>, page_size: usize) -> Self {
        Self {
            pool,
            page_size: page_size.max(1),
        }
    }

    /// Stored records of one platform matching `filter`.
    #[tracing::instrument(skip(self, filter), fields(user_id = %id, platform = %platform))]
    pub async fn filter(
        &self,
        id: &UserId,
        platform: Platform,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SubmissionRecord>, SyncError> {
        let conn = self.pool.acquire().await?;
        let found = conn
            .filter_submissions(id, platform, filter)
            .await?
            .ok_or(SyncError::UserNotFound)?;
        debug!(matched = found.len(), "Filter query complete");
        crate::metrics::record_query("filter", found.len());
        Ok(found)
    }

    /// One page of the cross-platform feed, newest first, strictly before
    /// `before` (now, if absent).
    #[tracing::instrument(skip(self), fields(user_id = %id))]
    pub async fn page_before(
        &self,
        id: &UserId,
        before: Option<Timestamp>,
    ) -> Result<Vec<FeedEntry>, SyncError> {
        let before = before.unwrap_or_else(chrono::Utc::now);
        let conn = self.pool.acquire().await?;
        let page = conn
            .submissions_before(id, before, self.page_size)
            .await?
            .ok_or(SyncError::UserNotFound)?;
        crate::metrics::record_query("feed", page.len());
        Ok(page)
    }

    /// Every stored list, keyed by platform.
    #[tracing::instrument(skip(self), fields(user_id = %id))]
    pub async fn all(&self, id: &UserId) -> Result<BTreeMap<Platform, Vec<SubmissionRecord>>, SyncError> {
        let conn = self.pool.acquire().await?;
        let all = conn.all_submissions(id).await?.ok_or(SyncError::UserNotFound)?;
        crate::metrics::record_query("all", all.values().map(Vec::len).sum());
        Ok(all)
    }
}
