// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded pool gating concurrent access to the user store.
//!
//! The pool holds one shared base connection and a fixed number of permits.
//! [`ResourcePool::acquire`] waits for a permit and leases a clone of the base
//! connection as a [`PooledConnection`]. Dropping the lease returns the permit,
//! so release happens exactly once on every exit path, errors and panics
//! included.
//!
//! # Invariants
//!
//! - Outstanding leases never exceed [`capacity`](ResourcePool::capacity).
//! - [`reset`](ResourcePool::reset) swaps the base connection without touching
//!   outstanding leases; they keep the connection they were given.
//! - After [`close`](ResourcePool::close) every acquire fails with
//!   [`PoolError::Closed`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use submission_sync::pool::ResourcePool;
//! use submission_sync::storage::memory::InMemoryUserStore;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let pool = ResourcePool::from_store(Arc::new(InMemoryUserStore::new()), 2);
//! {
//!     let _a = pool.acquire().await.unwrap();
//!     let _b = pool.acquire().await.unwrap();
//!     assert_eq!(pool.in_use(), 2);
//!     assert!(pool.try_acquire().unwrap().is_none());
//! }
//! assert_eq!(pool.in_use(), 0);
//! # }
//! ```

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use crate::storage::traits::{StorageError, UserStore};

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("timed out after {0:?} waiting for a pooled connection")]
    Timeout(Duration),
    #[error("connection pool is closed")]
    Closed,
    #[error("failed to connect: {0}")]
    Connect(#[source] StorageError),
}

/// Builds the shared base connection. Called once at startup and again on
/// every [`ResourcePool::reset`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn UserStore>, StorageError>;
}

/// Connector that always hands back the same store.
pub struct StaticConnector(Arc<dyn UserStore>);

impl StaticConnector {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self(store)
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&self) -> Result<Arc<dyn UserStore>, StorageError> {
        Ok(self.0.clone())
    }
}

pub struct ResourcePool {
    base: RwLock<Arc<dyn UserStore>>,
    connector: Arc<dyn Connector>,
    permits: Arc<Semaphore>,
    capacity: usize,
    outstanding: Arc<AtomicUsize>,
    acquire_timeout: Option<Duration>,
    generation: AtomicU64,
}

impl ResourcePool {
    /// Dial the base connection and build a pool of `capacity` permits.
    pub async fn connect(connector: Arc<dyn Connector>, capacity: usize) -> Result<Self, PoolError> {
        let base = connector.connect().await.map_err(PoolError::Connect)?;
        info!(capacity, "Resource pool connected");
        Ok(Self::build(base, connector, capacity))
    }

    /// Pool over an already-open store.
    pub fn from_store(store: Arc<dyn UserStore>, capacity: usize) -> Self {
        let connector = Arc::new(StaticConnector::new(store.clone()));
        Self::build(store, connector, capacity)
    }

    fn build(base: Arc<dyn UserStore>, connector: Arc<dyn Connector>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            base: RwLock::new(base),
            connector,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            outstanding: Arc::new(AtomicUsize::new(0)),
            acquire_timeout: None,
            generation: AtomicU64::new(0),
        }
    }

    /// Default deadline applied by [`acquire`](Self::acquire). `None` waits forever.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Leases currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Number of times the base connection has been rebuilt.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Wait for a permit, bounded by the configured deadline if any.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        match self.acquire_timeout {
            Some(deadline) => self.acquire_within(deadline).await,
            None => self.acquire_unbounded().await,
        }
    }

    /// Wait at most `deadline` for a permit.
    pub async fn acquire_within(&self, deadline: Duration) -> Result<PooledConnection, PoolError> {
        match tokio::time::timeout(deadline, self.acquire_unbounded()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?deadline, in_use = self.in_use(), "Timed out waiting for pooled connection");
                crate::metrics::record_pool_acquire("timeout");
                Err(PoolError::Timeout(deadline))
            }
        }
    }

    /// Lease immediately if a permit is free.
    pub fn try_acquire(&self) -> Result<Option<PooledConnection>, PoolError> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(self.lease(permit))),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(PoolError::Closed),
        }
    }

    async fn acquire_unbounded(&self) -> Result<PooledConnection, PoolError> {
        let permit = self.permits.clone().acquire_owned().await.map_err(|_| {
            crate::metrics::record_pool_acquire("closed");
            PoolError::Closed
        })?;
        Ok(self.lease(permit))
    }

    fn lease(&self, permit: OwnedSemaphorePermit) -> PooledConnection {
        let in_use = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(in_use <= self.capacity);
        crate::metrics::record_pool_acquire("ok");
        crate::metrics::set_pool_in_use(in_use);
        PooledConnection {
            store: self.base.read().clone(),
            generation: self.generation(),
            outstanding: self.outstanding.clone(),
            _permit: permit,
        }
    }

    /// Return a lease. Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Rebuild the shared base connection after a fatal backend failure.
    ///
    /// Outstanding leases are not disturbed; new leases get the new base.
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self) -> Result<(), PoolError> {
        let fresh = self.connector.connect().await.map_err(PoolError::Connect)?;
        *self.base.write() = fresh;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(generation, in_use = self.in_use(), "Resource pool base connection rebuilt");
        Ok(())
    }

    /// Stop issuing leases, waiting up to `grace` for outstanding ones to come back.
    ///
    /// Returns `true` if every lease was returned before the pool closed.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self, grace: Option<Duration>) -> bool {
        let all = self.capacity as u32;
        let drained = match grace {
            Some(grace) => tokio::time::timeout(grace, self.permits.acquire_many(all)).await.ok(),
            None => Some(self.permits.acquire_many(all).await),
        };
        let clean = matches!(drained, Some(Ok(_)));
        self.permits.close();
        if clean {
            info!("Resource pool drained and closed");
        } else {
            warn!(in_use = self.in_use(), "Resource pool closed with leases outstanding");
        }
        clean
    }
}

/// A leased connection. Derefs to the store; returns its permit on drop.
pub struct PooledConnection {
    store: Arc<dyn UserStore>,
    generation: u64,
    outstanding: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Pool generation this lease was cut from.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for PooledConnection {
    type Target = dyn UserStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let in_use = self.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
        crate::metrics::set_pool_in_use(in_use);
        debug!(in_use, "Pooled connection released");
    }
}
