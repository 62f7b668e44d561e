// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Canonical submission record.
//!
//! Every platform adapter normalizes its wire format into [`SubmissionRecord`].
//! Platform-specific fields (ratings, problem slugs, contest ids) are dropped
//! at the adapter boundary; the core never sees them.
//!
//! # Example
//!
//! ```
//! use submission_sync::SubmissionRecord;
//! use chrono::{TimeZone, Utc};
//!
//! let record = SubmissionRecord::new(
//!     "Watermelon",
//!     "https://codeforces.com/problemset/problem/4/A",
//!     Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
//!     "AC",
//! )
//! .with_points(500.0)
//! .with_tags(["math", "brute force"]);
//!
//! assert!(record.has_tag("math"));
//! assert_eq!(record.language, None);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation time of a remote record. Also the unit of a watermark.
pub type Timestamp = DateTime<Utc>;

/// One user's attempt at one problem on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub name: String,
    pub url: String,
    pub creation_time: Timestamp,
    pub status: String,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SubmissionRecord {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        creation_time: Timestamp,
        status: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            creation_time,
            status: status.into(),
            points: 0.0,
            tags: Vec::new(),
            language: None,
        }
    }

    #[must_use]
    pub fn with_points(mut self, points: f64) -> Self {
        self.points = points;
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Exact, case-sensitive tag membership.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Epoch nanoseconds, the storage representation. `None` outside 1677..2262.
pub(crate) fn timestamp_to_nanos(ts: &Timestamp) -> Option<i64> {
    ts.timestamp_nanos_opt()
}

pub(crate) fn timestamp_from_nanos(nanos: i64) -> Timestamp {
    DateTime::from_timestamp_nanos(nanos)
}
