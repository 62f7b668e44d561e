// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Submission sync service.
//!
//! [`SubmissionSync`] ties the components together:
//! - [`ResourcePool`] gating access to the user store
//! - [`JobQueue`] with a fixed worker pool
//! - [`SyncProtocol`] running the incremental merge
//! - [`SubmissionQuery`] for the read paths
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → Draining → Stopped
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use submission_sync::{AdapterRegistry, ServiceState, SubmissionSync, SyncConfig};
//! use submission_sync::storage::memory::InMemoryUserStore;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let service = SubmissionSync::with_store(
//!     SyncConfig::default(),
//!     Arc::new(InMemoryUserStore::new()),
//!     AdapterRegistry::new(),
//! );
//! assert_eq!(service.state(), ServiceState::Created);
//!
//! service.start().await.unwrap();
//! assert!(service.is_running());
//!
//! assert!(service.shutdown().await);
//! assert_eq!(service.state(), ServiceState::Stopped);
//! # }
//! ```

mod types;
mod api;
mod lifecycle;

pub use types::{HealthCheck, ServiceState};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::adapters::AdapterRegistry;
use crate::backpressure::QueuePressure;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::pool::ResourcePool;
use crate::query::SubmissionQuery;
use crate::queue::{JobQueue, JobTracker};
use crate::storage::sql::SqlConnector;
use crate::storage::traits::{StorageError, UserStore};
use crate::sync::SyncProtocol;

/// Main service handle.
///
/// `Send + Sync`; share it behind an `Arc` between request handlers.
pub struct SubmissionSync {
    pub(super) config: SyncConfig,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<ServiceState>,
    pub(super) state_rx: watch::Receiver<ServiceState>,
    /// Outcome of the shutdown that reached `Stopped`
    pub(super) shutdown_clean: AtomicBool,

    pub(super) pool: Arc<ResourcePool>,
    pub(super) protocol: Arc<SyncProtocol>,
    pub(super) queue: JobQueue,
    pub(super) query: SubmissionQuery,
}

impl SubmissionSync {
    /// Build over an already-open store. The service starts in `Created`.
    pub fn with_store(config: SyncConfig, store: Arc<dyn UserStore>, registry: AdapterRegistry) -> Self {
        let pool = ResourcePool::from_store(store, config.pool_capacity);
        Self::from_pool(config, pool, registry)
    }

    /// Connect to `config.database_url` and build the service over it.
    pub async fn connect(config: SyncConfig, registry: AdapterRegistry) -> Result<Self, SyncError> {
        let Some(url) = config.database_url.clone() else {
            return Err(SyncError::Storage(StorageError::Backend(
                "database_url is not configured".to_string(),
            )));
        };
        let max_connections = u32::try_from(config.pool_capacity).unwrap_or(u32::MAX);
        let connector = Arc::new(SqlConnector::new(url, max_connections));
        let pool = ResourcePool::connect(connector, config.pool_capacity).await?;
        Ok(Self::from_pool(config, pool, registry))
    }

    fn from_pool(config: SyncConfig, pool: ResourcePool, registry: AdapterRegistry) -> Self {
        let (state_tx, state_rx) = watch::channel(ServiceState::Created);
        let pool = Arc::new(pool.with_acquire_timeout(config.acquire_timeout()));
        let protocol = Arc::new(SyncProtocol::from_config(pool.clone(), registry, &config));
        let tracker = Arc::new(JobTracker::new(config.job_status_retention));
        let queue = JobQueue::new(config.queue_capacity, tracker);
        let query = SubmissionQuery::new(pool.clone(), config.feed_page_size);

        info!(
            platforms = ?protocol.registry().platforms(),
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            pool_capacity = pool.capacity(),
            "Submission sync service created"
        );

        Self {
            config,
            state: state_tx,
            state_rx,
            shutdown_clean: AtomicBool::new(true),
            pool,
            protocol,
            queue,
            query,
        }
    }

    /// Get current service state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ServiceState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    #[must_use]
    pub fn protocol(&self) -> &Arc<SyncProtocol> {
        &self.protocol
    }

    #[must_use]
    pub fn pressure(&self) -> QueuePressure {
        self.queue.pressure()
    }

    /// Jobs buffered and not yet picked up by a worker.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Probe the store with a ping through the pool.
    ///
    /// Uses `try_acquire` so a saturated pool reports the store as reachable
    /// without waiting behind running jobs.
    async fn probe_store(&self) -> (bool, Option<u64>) {
        let start = std::time::Instant::now();
        let conn = match self.pool.try_acquire() {
            Ok(Some(conn)) => conn,
            Ok(None) => return (true, None),
            Err(_) => return (false, None),
        };
        match conn.ping().await {
            Ok(()) => (true, Some(start.elapsed().as_millis() as u64)),
            Err(_) => (false, None),
        }
    }

    /// Health report for readiness and diagnostics endpoints.
    pub async fn health_check(&self) -> HealthCheck {
        let state = self.state();
        let queue_pressure = self.queue.pressure();
        let accepting_jobs = !self.queue.is_closed() && queue_pressure.accepts_jobs();
        let ready = state == ServiceState::Running && accepting_jobs;
        let (store_connected, store_latency_ms) = self.probe_store().await;

        HealthCheck {
            state,
            ready,
            accepting_jobs,
            queue_depth: self.queue.depth(),
            queue_capacity: self.queue.capacity(),
            queue_pressure,
            pool_in_use: self.pool.in_use(),
            pool_capacity: self.pool.capacity(),
            store_connected,
            store_latency_ms,
            tracked_jobs: self.queue.tracker().len(),
            healthy: ready && store_connected,
        }
    }
}
