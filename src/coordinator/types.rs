// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the submission sync service.

use serde::Serialize;

use crate::backpressure::QueuePressure;

/// Service lifecycle state.
///
/// Use [`super::SubmissionSync::state()`] to check the current state or
/// [`super::SubmissionSync::state_receiver()`] to watch for changes.
///
/// ```text
/// Created → Running → Draining → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    /// Built, workers not started. Jobs are buffered but not run.
    Created,
    /// Workers draining the queue
    Running,
    /// Intake closed, buffered jobs finishing within the grace period
    Draining,
    /// Workers joined and pool closed
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Point-in-time health report.
///
/// Everything except the store probe is read from in-memory counters.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub state: ServiceState,
    /// Running and accepting jobs
    pub ready: bool,
    pub accepting_jobs: bool,

    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub queue_pressure: QueuePressure,

    pub pool_in_use: usize,
    pub pool_capacity: usize,

    /// Store answered a ping
    pub store_connected: bool,
    pub store_latency_ms: Option<u64>,

    /// Job statuses currently retained
    pub tracked_jobs: usize,

    /// Running, store reachable, queue not full
    pub healthy: bool,
}
