// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public API: sync triggers, job status, reads and user administration.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::SyncError;
use crate::platform::Platform;
use crate::query::{FeedEntry, SubmissionFilter};
use crate::queue::{Job, JobId, JobStatus};
use crate::submission::{SubmissionRecord, Timestamp};
use crate::user::{UserId, UserRecord};

use super::SubmissionSync;

impl SubmissionSync {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Sync triggers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Schedule a background sync of `platform` for `user_id`.
    ///
    /// Returns as soon as the job is buffered; the sync outcome is only
    /// visible through [`job_status`](Self::job_status) and the stored data.
    ///
    /// # Errors
    /// - [`SyncError::BadInput`] if no adapter is registered for `platform`
    /// - [`SyncError::ResourceExhausted`] if the queue is full
    /// - [`SyncError::ShuttingDown`] once shutdown has begun
    pub fn enqueue_sync(&self, user_id: &UserId, platform: Platform) -> Result<JobId, SyncError> {
        if !self.protocol.registry().supports(platform) {
            return Err(SyncError::BadInput(format!("no adapter registered for {}", platform)));
        }
        self.queue.enqueue(Job::new(user_id.clone(), platform))
    }

    /// Status of an accepted job, if still retained.
    #[must_use]
    pub fn job_status(&self, id: &JobId) -> Option<JobStatus> {
        self.queue.tracker().get(id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stored records of one platform matching `filter`.
    pub async fn filter_submissions(
        &self,
        user_id: &UserId,
        platform: Platform,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SubmissionRecord>, SyncError> {
        self.query.filter(user_id, platform, filter).await
    }

    /// One page of the cross-platform feed, newest first.
    pub async fn submissions_before(
        &self,
        user_id: &UserId,
        before: Option<Timestamp>,
    ) -> Result<Vec<FeedEntry>, SyncError> {
        self.query.page_before(user_id, before).await
    }

    /// Every stored list, keyed by platform.
    pub async fn all_submissions(
        &self,
        user_id: &UserId,
    ) -> Result<BTreeMap<Platform, Vec<SubmissionRecord>>, SyncError> {
        self.query.all(user_id).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: User administration
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn get_user(&self, user_id: &UserId) -> Result<UserRecord, SyncError> {
        let conn = self.pool.acquire().await?;
        conn.get_user(user_id).await?.ok_or(SyncError::UserNotFound)
    }

    /// Create or replace a user document.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn upsert_user(&self, user: &UserRecord) -> Result<(), SyncError> {
        let conn = self.pool.acquire().await?;
        conn.upsert_user(user).await?;
        debug!("User stored");
        Ok(())
    }

    /// Set a platform handle; an empty handle clears it.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, platform = %platform))]
    pub async fn set_handle(&self, user_id: &UserId, platform: Platform, handle: &str) -> Result<(), SyncError> {
        let conn = self.pool.acquire().await?;
        match conn.set_handle(user_id, platform, handle.trim()).await {
            Ok(()) => Ok(()),
            Err(crate::storage::StorageError::NotFound) => Err(SyncError::UserNotFound),
            Err(e) => Err(e.into()),
        }
    }
}
