// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Out-of-band job status.
//!
//! Enqueue still only answers "accepted"; callers that want to know how a
//! job ended can look it up here by [`JobId`]. Finished statuses are kept for
//! the most recent `retention` jobs only.

use std::collections::VecDeque;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded { added: usize },
    Failed { reason: String },
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. } | Self::Cancelled)
    }

    /// Metrics label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

pub struct JobTracker {
    statuses: DashMap<JobId, JobStatus>,
    finished: Mutex<VecDeque<JobId>>,
    retention: usize,
}

impl JobTracker {
    pub fn new(retention: usize) -> Self {
        Self {
            statuses: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            retention: retention.max(1),
        }
    }

    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<JobStatus> {
        self.statuses.get(id).map(|s| s.value().clone())
    }

    pub(crate) fn queued(&self, id: JobId) {
        self.statuses.insert(id, JobStatus::Queued);
    }

    pub(crate) fn running(&self, id: JobId) {
        self.statuses.insert(id, JobStatus::Running);
    }

    /// Drop a status that never became visible (enqueue rejected).
    pub(crate) fn forget(&self, id: &JobId) {
        self.statuses.remove(id);
    }

    /// Record a terminal status, evicting the oldest finished entries.
    pub(crate) fn finish(&self, id: JobId, status: JobStatus) {
        debug_assert!(status.is_terminal());
        self.statuses.insert(id, status);
        let mut finished = self.finished.lock();
        finished.push_back(id);
        while finished.len() > self.retention {
            if let Some(old) = finished.pop_front() {
                self.statuses.remove(&old);
            }
        }
    }

    /// Statuses currently held, finished or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let tracker = JobTracker::new(10);
        let id = JobId::new();
        assert_eq!(tracker.get(&id), None);

        tracker.queued(id);
        assert_eq!(tracker.get(&id), Some(JobStatus::Queued));
        tracker.running(id);
        tracker.finish(id, JobStatus::Succeeded { added: 4 });
        assert_eq!(tracker.get(&id), Some(JobStatus::Succeeded { added: 4 }));
    }

    #[test]
    fn test_retention_evicts_oldest_finished() {
        let tracker = JobTracker::new(2);
        let ids: Vec<JobId> = (0..3).map(|_| JobId::new()).collect();
        let pending = JobId::new();
        tracker.queued(pending);

        for id in &ids {
            tracker.queued(*id);
            tracker.finish(*id, JobStatus::Cancelled);
        }

        assert_eq!(tracker.get(&ids[0]), None);
        assert!(tracker.get(&ids[1]).is_some());
        assert!(tracker.get(&ids[2]).is_some());
        assert_eq!(tracker.get(&pending), Some(JobStatus::Queued));
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let json = serde_json::to_value(JobStatus::Failed { reason: "boom".into() }).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
