// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Circuit breaker pattern using recloser crate.
//!
//! One breaker per platform stops a dead upstream from tying up workers.
//! Only errors the caller marks as failures count against the breaker; a
//! permanent error (unknown handle, bad payload) says nothing about the
//! upstream's health and passes through uncounted.
//!
//! States:
//! - Closed: Normal operation, requests pass through
//! - Open: Upstream unhealthy, requests fail-fast without attempting
//! - HalfOpen: Testing if upstream recovered, limited requests allowed

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use tracing::{debug, warn};

use crate::platform::Platform;

/// Error type for circuit-protected operations
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open)
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Failure rate (0.0 - 1.0) over the closed window that trips the circuit
    pub failure_rate: f32,
    /// Calls observed while closed before the rate is evaluated
    pub window: usize,
    /// Calls let through while half-open
    pub half_open_probes: usize,
    /// How long to stay open before probing
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.5,
            window: 10,
            half_open_probes: 2,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    /// Fast recovery for testing
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_rate: 0.5,
            window: 2,
            half_open_probes: 1,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

/// Counters for one breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
}

/// A named circuit breaker with metrics tracking
pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,

    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(config.failure_rate)
            .closed_len(config.window.max(1))
            .half_open_len(config.half_open_probes.max(1))
            .open_wait(config.recovery_timeout)
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` through the breaker, counting every error as a failure.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_counting(|_| true, f).await
    }

    /// Run `f` through the breaker; only errors accepted by `counts` are
    /// recorded as failures. The rest come back as [`CircuitError::Inner`]
    /// with the breaker seeing a success.
    pub async fn call_counting<F, Fut, T, E, P>(&self, counts: P, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        let guarded = async move {
            match f().await {
                Ok(v) => Ok(Ok(v)),
                Err(e) if counts(&e) => Err(e),
                Err(e) => Ok(Err(e)),
            }
        };

        match self.inner.call(guarded).await {
            Ok(Ok(result)) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "Circuit call succeeded");
                crate::metrics::record_circuit_call(&self.name, "success");
                Ok(result)
            }
            Ok(Err(e)) => {
                debug!(circuit = %self.name, "Circuit call failed with uncounted error");
                crate::metrics::record_circuit_call(&self.name, "uncounted");
                Err(CircuitError::Inner(e))
            }
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                warn!(circuit = %self.name, "Circuit breaker rejected call (open)");
                crate::metrics::record_circuit_call(&self.name, "rejected");
                Err(CircuitError::Rejected)
            }
            Err(RecloserError::Inner(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "Circuit call failed");
                crate::metrics::record_circuit_call(&self.name, "failure");
                Err(CircuitError::Inner(e))
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            calls: self.calls_total.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// One breaker per platform, built up front.
pub struct PlatformCircuits {
    breakers: HashMap<Platform, Arc<CircuitBreaker>>,
}

impl Default for PlatformCircuits {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

impl PlatformCircuits {
    pub fn new(config: CircuitConfig) -> Self {
        let breakers = Platform::ALL
            .into_iter()
            .map(|p| (p, Arc::new(CircuitBreaker::new(format!("adapter_{}", p), config.clone()))))
            .collect();
        Self { breakers }
    }

    /// Breaker for `platform`.
    #[must_use]
    pub fn get(&self, platform: Platform) -> Arc<CircuitBreaker> {
        match self.breakers.get(&platform) {
            Some(b) => b.clone(),
            // Every platform is populated in `new`.
            None => Arc::new(CircuitBreaker::new(format!("adapter_{}", platform), CircuitConfig::default())),
        }
    }

    /// Stats for every platform, in [`Platform::ALL`] order.
    #[must_use]
    pub fn stats(&self) -> Vec<(Platform, CircuitStats)> {
        Platform::ALL
            .into_iter()
            .filter_map(|p| self.breakers.get(&p).map(|b| (p, b.stats())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_circuit_passes_successful_calls() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());

        let result: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.stats().successes, 1);
        assert_eq!(cb.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_circuit_tracks_failures() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());

        let result: Result<i32, CircuitError<&str>> = cb.call(|| async { Err("boom") }).await;

        assert!(matches!(result, Err(CircuitError::Inner("boom"))));
        assert_eq!(cb.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_circuit_opens_after_failures() {
        let config = CircuitConfig {
            recovery_timeout: Duration::from_secs(60),
            ..CircuitConfig::test()
        };
        let cb = CircuitBreaker::new("test", config);

        for _ in 0..4 {
            let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Err("fail") }).await;
        }
        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(42) }).await;

        // Exact tripping point depends on recloser's ring buffer.
        let stats = cb.stats();
        assert!(stats.failures >= 2 || stats.rejections >= 1);
    }

    #[tokio::test]
    async fn test_uncounted_errors_never_trip() {
        let config = CircuitConfig {
            recovery_timeout: Duration::from_secs(60),
            ..CircuitConfig::test()
        };
        let cb = CircuitBreaker::new("test", config);

        for _ in 0..10 {
            let result: Result<i32, CircuitError<&str>> =
                cb.call_counting(|e: &&str| *e != "permanent", || async { Err("permanent") }).await;
            assert!(matches!(result, Err(CircuitError::Inner("permanent"))));
        }

        let ok: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(cb.stats().failures, 0);
        assert_eq!(cb.stats().rejections, 0);
    }

    #[tokio::test]
    async fn test_circuit_with_async_state() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        let result: Result<usize, CircuitError<&str>> = cb
            .call(|| async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(counter_clone.load(Ordering::SeqCst))
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_platform_circuits_are_independent() {
        let circuits = PlatformCircuits::new(CircuitConfig::test());

        let _: Result<i32, CircuitError<&str>> = circuits.get(Platform::Codeforces).call(|| async { Err("down") }).await;
        let _: Result<i32, CircuitError<&str>> = circuits.get(Platform::Spoj).call(|| async { Ok(1) }).await;

        assert_eq!(circuits.get(Platform::Codeforces).name(), "adapter_codeforces");
        let stats: HashMap<_, _> = circuits.stats().into_iter().collect();
        assert_eq!(stats[&Platform::Codeforces].failures, 1);
        assert_eq!(stats[&Platform::Spoj].successes, 1);
        assert_eq!(stats[&Platform::Hackerrank], CircuitStats::default());
    }
}
