// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Service lifecycle: start and drain-then-close shutdown.

use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::error::SyncError;
use super::{ServiceState, SubmissionSync};

impl SubmissionSync {
    /// Start the worker pool.
    ///
    /// Checks the store is reachable, then moves `Created → Running`.
    /// Jobs enqueued before start are picked up as soon as workers run.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SyncError> {
        if self.state() != ServiceState::Created {
            return Err(SyncError::Internal(format!("cannot start from state {}", self.state())));
        }

        {
            let conn = self.pool.acquire().await?;
            conn.ping().await?;
        }

        let started = self.state.send_if_modified(|state| {
            if *state == ServiceState::Created {
                *state = ServiceState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(SyncError::Internal("service was started concurrently".to_string()));
        }

        self.queue.spawn_workers(self.config.worker_count, self.protocol.clone());
        crate::metrics::set_service_state("Running");
        info!(workers = self.config.worker_count, "Submission sync service running");
        Ok(())
    }

    /// Graceful shutdown.
    ///
    /// 1. Stop accepting jobs (`Draining`)
    /// 2. Let workers finish buffered jobs within `shutdown_grace_ms`
    /// 3. Cancel whatever is still in flight
    /// 4. Close the pool once outstanding leases come back (`Stopped`)
    ///
    /// Returns `true` if nothing had to be cancelled. Only the first caller
    /// drains; concurrent callers wait for `Stopped` and report the same
    /// outcome.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> bool {
        let mut previous = ServiceState::Stopped;
        let claimed = self.state.send_if_modified(|state| {
            previous = *state;
            if matches!(*state, ServiceState::Created | ServiceState::Running) {
                *state = ServiceState::Draining;
                true
            } else {
                false
            }
        });
        if !claimed {
            let mut rx = self.state.subscribe();
            // Sender is owned by `self`; the channel stays open.
            let _ = rx.wait_for(|state| *state == ServiceState::Stopped).await;
            return self.shutdown_clean.load(Ordering::Acquire);
        }

        info!(from = %previous, depth = self.queue.depth(), "Initiating submission sync shutdown...");
        crate::metrics::set_service_state("Draining");

        let grace = self.config.shutdown_grace();
        let jobs_clean = self.queue.drain(grace).await;
        let pool_clean = self.pool.close(Some(grace)).await;

        let clean = jobs_clean && pool_clean;
        self.shutdown_clean.store(clean, Ordering::Release);
        let _ = self.state.send(ServiceState::Stopped);
        crate::metrics::set_service_state("Stopped");

        if clean {
            info!("Submission sync shutdown complete");
        } else {
            warn!(jobs_clean, pool_clean, "Submission sync stopped with work abandoned");
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::adapters::AdapterRegistry;
    use crate::config::SyncConfig;
    use crate::storage::memory::InMemoryUserStore;
    use super::*;

    fn service() -> SubmissionSync {
        SubmissionSync::with_store(
            SyncConfig { shutdown_grace_ms: 200, ..Default::default() },
            Arc::new(InMemoryUserStore::new()),
            AdapterRegistry::new(),
        )
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let service = service();
        service.start().await.unwrap();
        assert!(matches!(service.start().await, Err(SyncError::Internal(_))));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_transitions_are_broadcast() {
        let service = service();
        let mut rx = service.state_receiver();

        service.start().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ServiceState::Running);

        assert!(service.shutdown().await);
        assert_eq!(*rx.borrow_and_update(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let service = service();
        service.start().await.unwrap();
        assert!(service.shutdown().await);
        assert!(service.shutdown().await);
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_concurrent_shutdowns_drain_once_and_wait() {
        let service = service();
        service.start().await.unwrap();

        let (a, b) = tokio::join!(service.shutdown(), service.shutdown());
        assert!(a && b);
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.pool.is_closed());
    }

    #[tokio::test]
    async fn test_late_shutdown_waits_for_stopped() {
        let service = Arc::new(service());
        service.start().await.unwrap();
        let mut rx = service.state_receiver();

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.shutdown().await }
        });
        rx.wait_for(|s| *s != ServiceState::Running).await.unwrap();

        // Returns only once the first call has stopped the service.
        assert!(service.shutdown().await);
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(first.await.unwrap());
    }

    #[tokio::test]
    async fn test_cannot_start_after_shutdown() {
        let service = service();
        service.shutdown().await;
        assert!(service.start().await.is_err());
    }
}
