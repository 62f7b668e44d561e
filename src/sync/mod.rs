// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Incremental fetch-and-merge for one `(user, platform)` pair.
//!
//! # Protocol
//!
//! ```text
//! lock (user, platform) ──► acquire pool lease ──► read handle + watermark
//!                                                        │
//!          ┌─────────── UserNotFound / HandleNotFound ◄──┤ (no side effects)
//!          │                                             ▼
//!          │                 fetch(handle, watermark) under deadline,
//!          │                 retry (transient only), circuit breaker
//!          │                                             │
//!          │                     validate newest-first, all > watermark
//!          │                                             │
//!          │              empty ──► UpToDate             ▼
//!          │                         merge: append list + watermark = newest
//!          ▼                                (one atomic store update)
//!       caller
//! ```
//!
//! The keyed lock makes a second sync for the same pair wait and then read
//! the watermark the first one committed, so a remote record is never
//! appended twice. Fetch failures leave storage untouched; rerunning with the
//! stale watermark is always safe.

pub mod locks;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterError, AdapterRegistry, PlatformAdapter};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::metrics::LatencyTimer;
use crate::platform::Platform;
use crate::pool::ResourcePool;
use crate::resilience::circuit_breaker::{CircuitError, PlatformCircuits};
use crate::resilience::retry::{retry_if, RetryConfig};
use crate::storage::StorageError;
use crate::submission::{SubmissionRecord, Timestamp};
use crate::user::UserId;

pub use locks::{KeyGuard, KeyedLocks};

/// Result of a sync that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The adapter had nothing newer than the watermark.
    UpToDate,
    /// `added` records were appended and the watermark moved to `watermark`.
    Merged { added: usize, watermark: Timestamp },
}

impl SyncOutcome {
    #[must_use]
    pub fn added(&self) -> usize {
        match self {
            Self::UpToDate => 0,
            Self::Merged { added, .. } => *added,
        }
    }
}

/// Check the adapter's ordering contract before anything is written.
pub(crate) fn validate_batch(records: &[SubmissionRecord], since: Option<Timestamp>) -> Result<(), AdapterError> {
    if let Some(pair) = records.windows(2).find(|w| w[0].creation_time < w[1].creation_time) {
        return Err(AdapterError::Permanent(format!(
            "adapter returned records out of order: {} before {}",
            pair[0].creation_time, pair[1].creation_time
        )));
    }
    if let (Some(since), Some(oldest)) = (since, records.last()) {
        if oldest.creation_time <= since {
            return Err(AdapterError::Permanent(format!(
                "adapter returned a record at {} not newer than watermark {}",
                oldest.creation_time, since
            )));
        }
    }
    Ok(())
}

pub struct SyncProtocol {
    pool: Arc<ResourcePool>,
    registry: AdapterRegistry,
    circuits: PlatformCircuits,
    locks: KeyedLocks<(UserId, Platform)>,
    retry: RetryConfig,
    fetch_timeout: Duration,
}

impl SyncProtocol {
    /// Protocol with default retry, deadline and breaker settings.
    pub fn new(pool: Arc<ResourcePool>, registry: AdapterRegistry) -> Self {
        Self::from_config(pool, registry, &SyncConfig::default())
    }

    pub fn from_config(pool: Arc<ResourcePool>, registry: AdapterRegistry, config: &SyncConfig) -> Self {
        Self {
            pool,
            registry,
            circuits: PlatformCircuits::new(config.circuit()),
            locks: KeyedLocks::new(),
            retry: config.fetch_retry(),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_circuits(mut self, circuits: PlatformCircuits) -> Self {
        self.circuits = circuits;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    #[must_use]
    pub fn circuits(&self) -> &PlatformCircuits {
        &self.circuits
    }

    /// Pairs currently syncing or waiting to.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }

    /// Run one sync to completion.
    pub async fn sync(&self, id: &UserId, platform: Platform) -> Result<SyncOutcome, SyncError> {
        self.sync_with_cancel(id, platform, &CancellationToken::new()).await
    }

    /// Run one sync, aborting the fetch if `cancel` fires.
    ///
    /// Cancellation is only observed before the merge starts; a merge in
    /// progress always completes.
    #[tracing::instrument(skip(self, cancel), fields(user_id = %id, platform = %platform))]
    pub async fn sync_with_cancel(
        &self,
        id: &UserId,
        platform: Platform,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let _timer = LatencyTimer::new("sync", "run");

        let adapter = self
            .registry
            .get(platform)
            .ok_or_else(|| SyncError::BadInput(format!("no adapter registered for {}", platform)))?;

        let _exclusive = tokio::select! {
            guard = self.locks.lock((id.clone(), platform)) => guard,
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        };
        let conn = tokio::select! {
            conn = self.pool.acquire() => conn?,
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        };

        let state = conn.sync_state(id, platform).await?.ok_or(SyncError::UserNotFound)?;
        let handle = state.usable_handle().ok_or(SyncError::HandleNotFound(platform))?;
        let since = state.watermark;
        debug!(handle, ?since, "Loaded sync state");

        let records = tokio::select! {
            fetched = self.fetch(adapter.as_ref(), platform, handle, since) => fetched?,
            _ = cancel.cancelled() => {
                warn!("Fetch cancelled");
                return Err(SyncError::Cancelled);
            }
        };

        let Some(newest) = records.first().map(|r| r.creation_time) else {
            debug!("No new submissions");
            return Ok(SyncOutcome::UpToDate);
        };

        match conn.merge_submissions(id, platform, &records, newest).await {
            Ok(()) => {}
            Err(StorageError::NotFound) => return Err(SyncError::UserNotFound),
            Err(e) => {
                crate::metrics::record_storage_error("merge");
                return Err(e.into());
            }
        }

        info!(added = records.len(), watermark = %newest, "Merged new submissions");
        crate::metrics::record_merged(platform.as_str(), records.len());
        Ok(SyncOutcome::Merged {
            added: records.len(),
            watermark: newest,
        })
    }

    /// Fetch through the platform's breaker, retrying transient failures
    /// within the fetch deadline, then check the result's ordering.
    async fn fetch(
        &self,
        adapter: &dyn PlatformAdapter,
        platform: Platform,
        handle: &str,
        since: Option<Timestamp>,
    ) -> Result<Vec<SubmissionRecord>, AdapterError> {
        let deadline = self.fetch_timeout;
        let op_name = format!("fetch {}/{}", platform, handle);
        let attempt = || async {
            let retried = retry_if(&op_name, &self.retry, AdapterError::is_transient, || adapter.fetch(handle, since));
            match tokio::time::timeout(deadline, retried).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Transient(format!("fetch timed out after {:?}", deadline))),
            }
        };

        let result = match self.circuits.get(platform).call_counting(AdapterError::is_transient, attempt).await {
            Ok(records) => validate_batch(&records, since).map(|()| records),
            Err(CircuitError::Rejected) => {
                Err(AdapterError::Transient(format!("circuit open for {}", platform)))
            }
            Err(CircuitError::Inner(e)) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) if e.is_transient() => "transient",
            Err(_) => "permanent",
        };
        crate::metrics::record_adapter_call(platform.as_str(), outcome);
        if let Err(e) = &result {
            warn!(error = %e, "Adapter fetch failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::storage::memory::InMemoryUserStore;
    use crate::storage::UserStore;
    use crate::user::UserRecord;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn rec(secs: i64) -> SubmissionRecord {
        SubmissionRecord::new(format!("P{}", secs), format!("https://x/{}", secs), ts(secs), "AC")
    }

    /// Serves scripted responses in order, then empty lists.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<Vec<Result<Vec<SubmissionRecord>, AdapterError>>>,
        calls: AtomicUsize,
        seen_since: Mutex<Vec<Option<Timestamp>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Vec<SubmissionRecord>, AdapterError>>) -> Arc<Self> {
            let mut responses = responses;
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl PlatformAdapter for Scripted {
        async fn fetch(&self, _: &str, since: Option<Timestamp>) -> Result<Vec<SubmissionRecord>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_since.lock().push(since);
            self.responses.lock().pop().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    async fn setup(adapter: Arc<Scripted>) -> (Arc<InMemoryUserStore>, SyncProtocol, UserId) {
        let store = Arc::new(InMemoryUserStore::new());
        let id = UserId::generate();
        store
            .upsert_user(&UserRecord::new(id.clone()).with_handle(Platform::Codeforces, "tourist"))
            .await
            .unwrap();
        let pool = Arc::new(ResourcePool::from_store(store.clone(), 2));
        let registry = AdapterRegistry::new().with(Platform::Codeforces, adapter);
        let protocol = SyncProtocol::new(pool, registry).with_retry(RetryConfig::test());
        (store, protocol, id)
    }

    #[test]
    fn test_validate_batch() {
        assert!(validate_batch(&[], Some(ts(5))).is_ok());
        assert!(validate_batch(&[rec(3), rec(3), rec(2)], Some(ts(1))).is_ok());
        assert!(validate_batch(&[rec(2), rec(3)], None).is_err());
        assert!(validate_batch(&[rec(3), rec(1)], Some(ts(1))).is_err());
    }

    #[tokio::test]
    async fn test_merge_advances_watermark() {
        let adapter = Scripted::new(vec![Ok(vec![rec(30), rec(20), rec(10)])]);
        let (store, protocol, id) = setup(adapter.clone()).await;

        let outcome = protocol.sync(&id, Platform::Codeforces).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Merged { added: 3, watermark: ts(30) });

        let outcome = protocol.sync(&id, Platform::Codeforces).await.unwrap();
        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert_eq!(*adapter.seen_since.lock(), vec![None, Some(ts(30))]);

        let state = store.sync_state(&id, Platform::Codeforces).await.unwrap().unwrap();
        assert_eq!(state.watermark, Some(ts(30)));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let adapter = Scripted::new(vec![
            Err(AdapterError::Transient("reset".into())),
            Ok(vec![rec(5)]),
        ]);
        let (_store, protocol, id) = setup(adapter.clone()).await;

        assert_eq!(protocol.sync(&id, Platform::Codeforces).await.unwrap().added(), 1);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried_and_leaves_store() {
        let adapter = Scripted::new(vec![Err(AdapterError::Permanent("no such handle".into()))]);
        let (store, protocol, id) = setup(adapter.clone()).await;
        let before = store.get_user(&id).await.unwrap();

        let err = protocol.sync(&id, Platform::Codeforces).await.unwrap_err();
        assert!(matches!(err, SyncError::Adapter(AdapterError::Permanent(_))));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_user(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_contract_violation_rejected_before_merge() {
        let adapter = Scripted::new(vec![Ok(vec![rec(1), rec(2)])]);
        let (store, protocol, id) = setup(adapter).await;

        let err = protocol.sync(&id, Platform::Codeforces).await.unwrap_err();
        assert_eq!(err.kind(), "adapter_permanent");
        let user = store.get_user(&id).await.unwrap().unwrap();
        assert!(user.submissions_for(Platform::Codeforces).is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_platform_is_bad_input() {
        let (_store, protocol, id) = setup(Scripted::new(vec![])).await;
        let err = protocol.sync(&id, Platform::Spoj).await.unwrap_err();
        assert!(matches!(err, SyncError::BadInput(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch_completes() {
        struct Hanging;

        #[async_trait]
        impl PlatformAdapter for Hanging {
            async fn fetch(&self, _: &str, _: Option<Timestamp>) -> Result<Vec<SubmissionRecord>, AdapterError> {
                std::future::pending().await
            }
        }

        let store = Arc::new(InMemoryUserStore::new());
        let id = UserId::generate();
        store
            .upsert_user(&UserRecord::new(id.clone()).with_handle(Platform::Spoj, "alice"))
            .await
            .unwrap();
        let pool = Arc::new(ResourcePool::from_store(store, 1));
        let protocol = SyncProtocol::new(pool.clone(), AdapterRegistry::new().with(Platform::Spoj, Arc::new(Hanging)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = protocol.sync_with_cancel(&id, Platform::Spoj, &cancel).await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(pool.in_use(), 0);
        assert_eq!(protocol.in_flight(), 0);
    }
}
