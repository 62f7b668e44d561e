// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Supported judge platforms.
//!
//! [`Platform`] is the closed dispatch tag carried by every sync job. It is
//! resolved to an adapter through the [`AdapterRegistry`](crate::adapters::AdapterRegistry)
//! at the point of execution, so a queued job never embeds executable state.
//!
//! # Example
//!
//! ```
//! use submission_sync::Platform;
//!
//! let platform: Platform = "CodeForces".parse().unwrap();
//! assert_eq!(platform, Platform::Codeforces);
//! assert_eq!(platform.as_str(), "codeforces");
//! assert!("topcoder".parse::<Platform>().is_err());
//! ```

use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Codechef,
    Codeforces,
    Hackerrank,
    Spoj,
}

impl Platform {
    /// Every supported platform, in storage order.
    pub const ALL: [Platform; 4] = [
        Platform::Codechef,
        Platform::Codeforces,
        Platform::Hackerrank,
        Platform::Spoj,
    ];

    /// Stable lowercase name, used as the storage key and in metric labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codechef => "codechef",
            Self::Codeforces => "codeforces",
            Self::Hackerrank => "hackerrank",
            Self::Spoj => "spoj",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| SyncError::BadInput(format!("invalid contest site: '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("codechef".parse::<Platform>().unwrap(), Platform::Codechef);
        assert_eq!("SPOJ".parse::<Platform>().unwrap(), Platform::Spoj);
        assert_eq!(" HackerRank ".parse::<Platform>().unwrap(), Platform::Hackerrank);
    }

    #[test]
    fn test_parse_rejects_unknown_site() {
        let err = "atcoder".parse::<Platform>().unwrap_err();
        assert!(matches!(err, SyncError::BadInput(_)));
        assert!("".parse::<Platform>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for platform in Platform::ALL {
            assert_eq!(platform.to_string().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Platform::Codeforces).unwrap();
        assert_eq!(json, "\"codeforces\"");
        let back: Platform = serde_json::from_str("\"spoj\"").unwrap();
        assert_eq!(back, Platform::Spoj);
    }
}
