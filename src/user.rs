// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! User document shape as seen by the sync core.
//!
//! The user entity is owned by the broader system. The core only reads its
//! per-platform handles and watermarks and appends to its submission lists.

use std::collections::BTreeMap;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::platform::Platform;
use crate::submission::{SubmissionRecord, Timestamp};

/// Opaque user identifier: a 24-digit hex object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    const LEN: usize = 24;

    /// Parse an identifier supplied by a caller.
    ///
    /// Hex digits are normalized to lowercase. Anything that is not exactly
    /// 24 hex digits is rejected with [`SyncError::BadInput`].
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        if raw.len() != Self::LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SyncError::BadInput(format!("invalid user id: '{}'", raw)));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// Mint a fresh identifier (12 random bytes, hex encoded).
    #[must_use]
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..Self::LEN].to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// The full user document: handles, watermarks and stored submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub handles: BTreeMap<Platform, String>,
    /// Last merged creation time per platform.
    #[serde(default)]
    pub watermarks: BTreeMap<Platform, Timestamp>,
    /// Append-only, in the order merged.
    #[serde(default)]
    pub submissions: BTreeMap<Platform, Vec<SubmissionRecord>>,
}

impl UserRecord {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            handles: BTreeMap::new(),
            watermarks: BTreeMap::new(),
            submissions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_handle(mut self, platform: Platform, handle: impl Into<String>) -> Self {
        self.handles.insert(platform, handle.into());
        self
    }

    /// Projection of the fields sync needs for one platform.
    #[must_use]
    pub fn sync_state(&self, platform: Platform) -> SyncState {
        SyncState {
            handle: self.handles.get(&platform).cloned(),
            watermark: self.watermarks.get(&platform).copied(),
        }
    }

    #[must_use]
    pub fn submissions_for(&self, platform: Platform) -> &[SubmissionRecord] {
        self.submissions.get(&platform).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Point-lookup projection used by the merge protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub handle: Option<String>,
    pub watermark: Option<Timestamp>,
}

impl SyncState {
    /// The handle, if set to something non-blank.
    #[must_use]
    pub fn usable_handle(&self) -> Option<&str> {
        self.handle.as_deref().map(str::trim).filter(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_object_id_hex() {
        let id = UserId::parse("5F3C9A1B2C3D4E5F60718293").unwrap();
        assert_eq!(id.as_str(), "5f3c9a1b2c3d4e5f60718293");
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        for raw in ["", "abc", "5f3c9a1b2c3d4e5f6071829z", "5f3c9a1b2c3d4e5f607182930"] {
            assert!(matches!(UserId::parse(raw), Err(SyncError::BadInput(_))), "{raw}");
        }
    }

    #[test]
    fn test_generate_produces_parseable_ids() {
        let id = UserId::generate();
        assert_eq!(UserId::parse(id.as_str()).unwrap(), id);
        assert_ne!(UserId::generate(), id);
    }

    #[test]
    fn test_usable_handle_ignores_blank() {
        let blank = SyncState { handle: Some("   ".into()), watermark: None };
        assert_eq!(blank.usable_handle(), None);

        let set = SyncState { handle: Some(" tourist ".into()), watermark: None };
        assert_eq!(set.usable_handle(), Some("tourist"));
    }

    #[test]
    fn test_sync_state_projection() {
        let user = UserRecord::new(UserId::generate()).with_handle(Platform::Spoj, "neo");
        let state = user.sync_state(Platform::Spoj);
        assert_eq!(state.handle.as_deref(), Some("neo"));
        assert!(state.watermark.is_none());
        assert!(user.sync_state(Platform::Codechef).handle.is_none());
        assert!(user.submissions_for(Platform::Spoj).is_empty());
    }

    #[test]
    fn test_user_id_serde_validates() {
        let ok: Result<UserId, _> = serde_json::from_str("\"5f3c9a1b2c3d4e5f60718293\"");
        assert!(ok.is_ok());
        let bad: Result<UserId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
