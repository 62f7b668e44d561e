// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::Platform;
use crate::submission::Timestamp;
use crate::user::UserId;

/// Identifier handed back when a job is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = crate::error::SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| crate::error::SyncError::BadInput(format!("invalid job id: '{}'", s)))
    }
}

/// A request to sync one platform for one user.
///
/// Plain data: the platform tag is resolved to an adapter by the worker, so
/// a job can cross any queue boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub platform: Platform,
    pub enqueued_at: Timestamp,
}

impl Job {
    pub fn new(user_id: UserId, platform: Platform) -> Self {
        Self {
            id: JobId::new(),
            user_id,
            platform,
            enqueued_at: chrono::Utc::now(),
        }
    }
}
