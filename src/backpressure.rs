// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backpressure levels derived from job queue fill.
//!
//! Enqueue never blocks: a full queue rejects at once. The level below the
//! full mark only shapes the `Retry-After` hint and log severity.
//!
//! # Example
//!
//! ```
//! use submission_sync::QueuePressure;
//!
//! let level = QueuePressure::from_fill(50, 100);
//! assert_eq!(level, QueuePressure::Normal);
//! assert!(level.accepts_jobs());
//!
//! let level = QueuePressure::from_fill(95, 100);
//! assert_eq!(level, QueuePressure::Critical);
//! assert!(level.accepts_jobs());
//!
//! let level = QueuePressure::from_fill(100, 100);
//! assert_eq!(level, QueuePressure::Full);
//! assert!(!level.accepts_jobs());
//! ```

use serde::Serialize;

/// Queue pressure level.
///
/// - **Normal** (< 70%): accept everything
/// - **Warn** (70-90%): accept, log warnings
/// - **Critical** (90-100%): accept, callers should slow down
/// - **Full** (100%): reject with `ResourceExhausted` (HTTP 503)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePressure {
    Normal = 0,
    Warn = 1,
    Critical = 2,
    Full = 3,
}

impl QueuePressure {
    /// Level for `depth` queued jobs out of `capacity`.
    #[must_use]
    pub fn from_fill(depth: usize, capacity: usize) -> Self {
        if capacity == 0 || depth >= capacity {
            return Self::Full;
        }
        Self::from_ratio(depth as f64 / capacity as f64)
    }

    /// Level from a fill ratio (0.0 → 1.0).
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        match ratio {
            r if r < 0.70 => Self::Normal,
            r if r < 0.90 => Self::Warn,
            r if r < 1.0 => Self::Critical,
            _ => Self::Full,
        }
    }

    #[must_use]
    pub fn accepts_jobs(&self) -> bool {
        !matches!(self, Self::Full)
    }

    /// Suggested HTTP status code for a rejected enqueue at this level.
    #[must_use]
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::Full => Some(503),
            _ => None,
        }
    }

    /// Suggested Retry-After header value (seconds).
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Normal => 1,
            Self::Warn => 2,
            Self::Critical => 5,
            Self::Full => 10,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "Normal operation",
            Self::Warn => "Warning - queue filling up",
            Self::Critical => "Critical - queue nearly full",
            Self::Full => "Full - new jobs rejected",
        }
    }
}

impl std::fmt::Display for QueuePressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_level_thresholds() {
        assert_eq!(QueuePressure::from_ratio(0.0), QueuePressure::Normal);
        assert_eq!(QueuePressure::from_ratio(0.69), QueuePressure::Normal);
        assert_eq!(QueuePressure::from_ratio(0.70), QueuePressure::Warn);
        assert_eq!(QueuePressure::from_ratio(0.89), QueuePressure::Warn);
        assert_eq!(QueuePressure::from_ratio(0.90), QueuePressure::Critical);
        assert_eq!(QueuePressure::from_ratio(0.99), QueuePressure::Critical);
        assert_eq!(QueuePressure::from_ratio(1.0), QueuePressure::Full);
    }

    #[test]
    fn test_from_fill_edges() {
        assert_eq!(QueuePressure::from_fill(0, 0), QueuePressure::Full);
        assert_eq!(QueuePressure::from_fill(0, 1), QueuePressure::Normal);
        assert_eq!(QueuePressure::from_fill(1, 1), QueuePressure::Full);
        assert_eq!(QueuePressure::from_fill(7, 10), QueuePressure::Warn);
    }

    #[test]
    fn test_only_full_rejects() {
        assert!(QueuePressure::Normal.accepts_jobs());
        assert!(QueuePressure::Warn.accepts_jobs());
        assert!(QueuePressure::Critical.accepts_jobs());
        assert!(!QueuePressure::Full.accepts_jobs());
        assert_eq!(QueuePressure::Full.http_status_code(), Some(503));
        assert_eq!(QueuePressure::Warn.http_status_code(), None);
    }

    #[test]
    fn test_retry_after_increases_with_severity() {
        let levels = [QueuePressure::Normal, QueuePressure::Warn, QueuePressure::Critical, QueuePressure::Full];
        for pair in levels.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].retry_after_secs() < pair[1].retry_after_secs());
        }
    }
}
