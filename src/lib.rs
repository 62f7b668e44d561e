// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Submission Sync
//!
//! Incremental, backpressured synchronization of a user's competitive
//! programming submissions from external judges into a per-user store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Ingest Layer                         │
//! │  • enqueue_sync(user, platform) never blocks               │
//! │  • Bounded JobQueue rejects when full (backpressure)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (fixed worker pool)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SyncProtocol                          │
//! │  • Per-(user, platform) mutual exclusion                   │
//! │  • Reads handle + watermark, fetches newer records         │
//! │  • Appends and advances the watermark in one update        │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                            │
//!                 ▼                            ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │        ResourcePool          │  │       PlatformAdapters       │
//! │  • Bounded store permits     │  │  • Retry + circuit breaker   │
//! │  • SQLite/MySQL or memory    │  │  • Typed wire parsers        │
//! └──────────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use submission_sync::{
//!     AdapterRegistry, HttpTransport, Platform, SubmissionFilter, SubmissionSync, SyncConfig, UserId,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SyncConfig {
//!         database_url: Some("sqlite://sync.db?mode=rwc".into()),
//!         ..Default::default()
//!     };
//!     let transport = Arc::new(HttpTransport::new(config.fetch_timeout()).expect("http client"));
//!     let registry = AdapterRegistry::with_http_defaults(transport, config.adapter_page_size);
//!
//!     let service = SubmissionSync::connect(config, registry).await.expect("connect");
//!     service.start().await.expect("start");
//!
//!     let user = UserId::parse("5f1d7c2a9b3e4d6f8a0b1c2d").expect("user id");
//!     let job = service.enqueue_sync(&user, Platform::Codeforces).expect("enqueue");
//!     println!("queued {job}");
//!
//!     let accepted = service
//!         .filter_submissions(&user, Platform::Codeforces, &SubmissionFilter::status("AC"))
//!         .await;
//!     println!("{accepted:?}");
//!
//!     service.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: [`SubmissionSync`], lifecycle and public API
//! - [`sync`]: the incremental merge and per-pair locking
//! - [`queue`]: bounded job queue, workers, job status tracking
//! - [`pool`]: bounded store connection pool
//! - [`storage`]: store contract with memory and SQL backends
//! - [`adapters`]: platform adapters and the HTTP transport
//! - [`resilience`]: retry with backoff, circuit breakers
//! - [`query`]: filter, feed and full reads
//! - [`backpressure`]: queue pressure levels

pub mod config;
pub mod error;
pub mod platform;
pub mod submission;
pub mod user;
pub mod storage;
pub mod pool;
pub mod adapters;
pub mod resilience;
pub mod sync;
pub mod queue;
pub mod query;
pub mod backpressure;
pub mod coordinator;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::SyncConfig;
pub use error::SyncError;
pub use platform::Platform;
pub use submission::{SubmissionRecord, Timestamp};
pub use user::{SyncState, UserId, UserRecord};
pub use storage::traits::{StorageError, UserStore};
pub use pool::{PoolError, PooledConnection, ResourcePool};
pub use adapters::{AdapterError, AdapterRegistry, HttpTransport, PlatformAdapter, Transport};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError, PlatformCircuits};
pub use resilience::retry::RetryConfig;
pub use sync::{SyncOutcome, SyncProtocol};
pub use queue::{Job, JobId, JobQueue, JobStatus, JobTracker};
pub use query::{FeedEntry, SubmissionFilter, SubmissionQuery};
pub use backpressure::QueuePressure;
pub use coordinator::{HealthCheck, ServiceState, SubmissionSync};
pub use metrics::LatencyTimer;
