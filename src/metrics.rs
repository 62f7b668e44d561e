// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for submission-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding service is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `submission_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `platform`: codechef, codeforces, hackerrank, spoj
//! - `outcome`: accepted, rejected, succeeded, failed, ...

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an enqueue attempt
pub fn record_enqueue(platform: &str, outcome: &str) {
    counter!(
        "submission_sync_enqueue_total",
        "platform" => platform.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set jobs currently buffered in the queue
pub fn set_queue_depth(depth: usize) {
    gauge!("submission_sync_queue_depth").set(depth as f64);
}

/// Record how a job finished
pub fn record_job_outcome(platform: &str, outcome: &str) {
    counter!(
        "submission_sync_jobs_total",
        "platform" => platform.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record records appended by one merge
pub fn record_merged(platform: &str, count: usize) {
    counter!(
        "submission_sync_merged_records_total",
        "platform" => platform.to_string()
    )
    .increment(count as u64);
}

/// Record one adapter fetch (after retries)
pub fn record_adapter_call(platform: &str, outcome: &str) {
    counter!(
        "submission_sync_adapter_calls_total",
        "platform" => platform.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record circuit breaker call outcome
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "submission_sync_circuit_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a pool acquire outcome (ok, timeout, closed)
pub fn record_pool_acquire(outcome: &str) {
    counter!(
        "submission_sync_pool_acquire_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set connections currently leased from the pool
pub fn set_pool_in_use(count: usize) {
    gauge!("submission_sync_pool_in_use").set(count as f64);
}

/// Record a read query and how many records it returned
pub fn record_query(kind: &str, count: usize) {
    counter!(
        "submission_sync_queries_total",
        "kind" => kind.to_string()
    )
    .increment(1);
    histogram!(
        "submission_sync_query_results",
        "kind" => kind.to_string()
    )
    .record(count as f64);
}

/// Record a storage-layer error
pub fn record_storage_error(operation: &str) {
    counter!(
        "submission_sync_storage_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(component: &str, operation: &str, duration: Duration) {
    histogram!(
        "submission_sync_operation_seconds",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set service state (for monitoring lifecycle transitions)
pub fn set_service_state(state: &str) {
    counter!(
        "submission_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    component: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.component, self.operation, self.start.elapsed());
    }
}
