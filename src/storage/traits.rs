// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::BTreeMap;
use async_trait::async_trait;
use thiserror::Error;

use crate::platform::Platform;
use crate::query::{FeedEntry, SubmissionFilter};
use crate::submission::{SubmissionRecord, Timestamp};
use crate::user::{SyncState, UserId, UserRecord};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("User not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Stored document for '{id}' is unreadable: {detail}")]
    Corruption {
        id: String,
        detail: String,
    },
}

/// Document store holding one record per user.
///
/// Required properties:
/// - [`merge_submissions`](Self::merge_submissions) applies the list append and
///   the watermark set as one atomic update. Concurrent readers observe either
///   both or neither.
/// - The stored per-platform list only grows.
/// - A stored watermark never moves backwards.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Point lookup with projection to one platform's handle and watermark.
    /// `Ok(None)` when the user does not exist.
    async fn sync_state(&self, id: &UserId, platform: Platform) -> Result<Option<SyncState>, StorageError>;

    /// Atomically append `records` (in the given order) to the platform list
    /// and advance the platform watermark to `watermark`.
    ///
    /// Returns [`StorageError::NotFound`] if the user does not exist.
    async fn merge_submissions(
        &self,
        id: &UserId,
        platform: Platform,
        records: &[SubmissionRecord],
        watermark: Timestamp,
    ) -> Result<(), StorageError>;

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>, StorageError>;

    /// Insert or replace a whole user document.
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StorageError>;

    /// Set (or clear, with an empty string) a platform handle.
    async fn set_handle(&self, id: &UserId, platform: Platform, handle: &str) -> Result<(), StorageError>;

    /// Match user, unwind the platform list, match the filter, project records.
    /// `Ok(None)` only when the user does not exist.
    async fn filter_submissions(
        &self,
        id: &UserId,
        platform: Platform,
        filter: &SubmissionFilter,
    ) -> Result<Option<Vec<SubmissionRecord>>, StorageError> {
        Ok(self.get_user(id).await?.map(|user| {
            user.submissions_for(platform)
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect()
        }))
    }

    /// Records from every platform created strictly before `before`,
    /// newest first, at most `limit` of them.
    async fn submissions_before(
        &self,
        id: &UserId,
        before: Timestamp,
        limit: usize,
    ) -> Result<Option<Vec<FeedEntry>>, StorageError> {
        Ok(self.get_user(id).await?.map(|user| {
            let mut feed: Vec<FeedEntry> = user
                .submissions
                .into_iter()
                .flat_map(|(platform, records)| {
                    records.into_iter().map(move |record| FeedEntry { platform, record })
                })
                .filter(|entry| entry.record.creation_time < before)
                .collect();
            feed.sort_by(|a, b| b.record.creation_time.cmp(&a.record.creation_time));
            feed.truncate(limit);
            feed
        }))
    }

    async fn all_submissions(
        &self,
        id: &UserId,
    ) -> Result<Option<BTreeMap<Platform, Vec<SubmissionRecord>>>, StorageError> {
        Ok(self.get_user(id).await?.map(|user| user.submissions))
    }

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
