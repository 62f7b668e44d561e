// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::platform::Platform;
use crate::submission::{SubmissionRecord, Timestamp};
use crate::user::{SyncState, UserId, UserRecord};
use super::traits::{StorageError, UserStore};

/// In-memory user documents.
///
/// `merge_submissions` mutates the document while holding its shard write
/// lock, so the append and the watermark set are observed together.
pub struct InMemoryUserStore {
    users: DashMap<UserId, UserRecord>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    /// Get current user count
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn sync_state(&self, id: &UserId, platform: Platform) -> Result<Option<SyncState>, StorageError> {
        Ok(self.users.get(id).map(|user| user.sync_state(platform)))
    }

    async fn merge_submissions(
        &self,
        id: &UserId,
        platform: Platform,
        records: &[SubmissionRecord],
        watermark: Timestamp,
    ) -> Result<(), StorageError> {
        let mut user = self.users.get_mut(id).ok_or(StorageError::NotFound)?;
        user.submissions
            .entry(platform)
            .or_default()
            .extend_from_slice(records);
        let current = user.watermarks.entry(platform).or_insert(watermark);
        if watermark > *current {
            *current = watermark;
        }
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>, StorageError> {
        Ok(self.users.get(id).map(|r| r.value().clone()))
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn set_handle(&self, id: &UserId, platform: Platform, handle: &str) -> Result<(), StorageError> {
        let mut user = self.users.get_mut(id).ok_or(StorageError::NotFound)?;
        if handle.is_empty() {
            user.handles.remove(&platform);
        } else {
            user.handles.insert(platform, handle.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::query::SubmissionFilter;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(secs: i64, status: &str) -> SubmissionRecord {
        SubmissionRecord::new(format!("P{}", secs), format!("https://example.com/{}", secs), at(secs), status)
    }

    async fn store_with_user() -> (InMemoryUserStore, UserId) {
        let store = InMemoryUserStore::new();
        let id = UserId::generate();
        store
            .upsert_user(&UserRecord::new(id.clone()).with_handle(Platform::Codeforces, "tourist"))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryUserStore::default();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_sync_state_for_missing_user_is_none() {
        let store = InMemoryUserStore::new();
        let state = store.sync_state(&UserId::generate(), Platform::Spoj).await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_merge_appends_and_sets_watermark() {
        let (store, id) = store_with_user().await;

        store
            .merge_submissions(&id, Platform::Codeforces, &[record(3, "AC"), record(2, "WA")], at(3))
            .await
            .unwrap();
        store
            .merge_submissions(&id, Platform::Codeforces, &[record(5, "AC")], at(5))
            .await
            .unwrap();

        let user = store.get_user(&id).await.unwrap().unwrap();
        let times: Vec<i64> = user
            .submissions_for(Platform::Codeforces)
            .iter()
            .map(|r| r.creation_time.timestamp())
            .collect();
        assert_eq!(times, vec![3, 2, 5]);
        assert_eq!(user.watermarks[&Platform::Codeforces], at(5));
    }

    #[tokio::test]
    async fn test_merge_never_moves_watermark_backwards() {
        let (store, id) = store_with_user().await;
        store.merge_submissions(&id, Platform::Codeforces, &[record(9, "AC")], at(9)).await.unwrap();
        store.merge_submissions(&id, Platform::Codeforces, &[record(4, "AC")], at(4)).await.unwrap();

        let state = store.sync_state(&id, Platform::Codeforces).await.unwrap().unwrap();
        assert_eq!(state.watermark, Some(at(9)));
    }

    #[tokio::test]
    async fn test_merge_for_missing_user_fails() {
        let store = InMemoryUserStore::new();
        let result = store
            .merge_submissions(&UserId::generate(), Platform::Spoj, &[record(1, "AC")], at(1))
            .await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_set_handle_and_clear() {
        let (store, id) = store_with_user().await;
        store.set_handle(&id, Platform::Spoj, "neo").await.unwrap();
        assert_eq!(
            store.sync_state(&id, Platform::Spoj).await.unwrap().unwrap().handle.as_deref(),
            Some("neo")
        );

        store.set_handle(&id, Platform::Spoj, "").await.unwrap();
        assert!(store.sync_state(&id, Platform::Spoj).await.unwrap().unwrap().handle.is_none());

        let missing = store.set_handle(&UserId::generate(), Platform::Spoj, "x").await;
        assert!(matches!(missing, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_default_filter_and_feed() {
        let (store, id) = store_with_user().await;
        store
            .merge_submissions(&id, Platform::Codeforces, &[record(30, "AC"), record(20, "WA")], at(30))
            .await
            .unwrap();
        store.set_handle(&id, Platform::Spoj, "neo").await.unwrap();
        store.merge_submissions(&id, Platform::Spoj, &[record(25, "AC")], at(25)).await.unwrap();

        let accepted = store
            .filter_submissions(&id, Platform::Codeforces, &SubmissionFilter::status("AC"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.len(), 1);

        let feed = store.submissions_before(&id, at(30), 10).await.unwrap().unwrap();
        let times: Vec<i64> = feed.iter().map(|e| e.record.creation_time.timestamp()).collect();
        assert_eq!(times, vec![25, 20]);
        assert_eq!(feed[0].platform, Platform::Spoj);

        let limited = store.submissions_before(&id, at(100), 1).await.unwrap().unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].record.creation_time, at(30));
    }

    #[tokio::test]
    async fn test_concurrent_merges_for_different_platforms() {
        use std::sync::Arc;

        let (store, id) = store_with_user().await;
        let store = Arc::new(store);
        let mut handles = vec![];

        for (i, platform) in Platform::ALL.into_iter().enumerate() {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    let secs = (i as i64) * 100 + j;
                    store.merge_submissions(&id, platform, &[record(secs, "AC")], at(secs)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let user = store.get_user(&id).await.unwrap().unwrap();
        for platform in Platform::ALL {
            assert_eq!(user.submissions_for(platform).len(), 10);
        }
    }
}
