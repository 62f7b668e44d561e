// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Top-level error taxonomy.
//!
//! Layer-specific errors ([`StorageError`], [`PoolError`], [`AdapterError`])
//! convert into [`SyncError`] so `?` works across the stack. The thin HTTP
//! layer maps a [`SyncError`] to a status with [`SyncError::http_status`].
//!
//! # Example
//!
//! ```
//! use submission_sync::SyncError;
//!
//! let err = SyncError::ResourceExhausted { retry_after_secs: 5 };
//! assert_eq!(err.http_status(), 503);
//! assert_eq!(SyncError::UserNotFound.http_status(), 404);
//! ```

use thiserror::Error;

use crate::adapters::AdapterError;
use crate::pool::PoolError;
use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed identifier or parameter.
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("user not found")]
    UserNotFound,

    /// Platform handle unset (or blank) on the user's profile.
    #[error("handle not available for {0}")]
    HandleNotFound(crate::Platform),

    /// Queue at capacity, or pool acquire deadline elapsed.
    #[error("resource exhausted, retry after {retry_after_secs}s")]
    ResourceExhausted { retry_after_secs: u64 },

    #[error("adapter failure: {0}")]
    Adapter(#[from] AdapterError),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Queue or pool closed for shutdown.
    #[error("service is shutting down")]
    ShuttingDown,

    /// In-flight work aborted at shutdown.
    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Suggested HTTP status code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadInput(_) | Self::HandleNotFound(_) => 400,
            Self::UserNotFound => 404,
            Self::Adapter(_) => 502,
            Self::ResourceExhausted { .. } | Self::ShuttingDown | Self::Cancelled => 503,
            Self::Storage(_) | Self::Internal(_) => 500,
        }
    }

    /// Suggested Retry-After header value (seconds).
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::ResourceExhausted { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadInput(_) => "bad_input",
            Self::UserNotFound => "user_not_found",
            Self::HandleNotFound(_) => "handle_not_found",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::Adapter(e) if e.is_transient() => "adapter_transient",
            Self::Adapter(_) => "adapter_permanent",
            Self::Storage(_) => "storage",
            Self::ShuttingDown => "shutting_down",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<PoolError> for SyncError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Timeout(_) => SyncError::ResourceExhausted { retry_after_secs: 5 },
            PoolError::Closed => SyncError::ShuttingDown,
            PoolError::Connect(e) => SyncError::Storage(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::Platform;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(SyncError::BadInput("x".into()).http_status(), 400);
        assert_eq!(SyncError::HandleNotFound(Platform::Spoj).http_status(), 400);
        assert_eq!(SyncError::UserNotFound.http_status(), 404);
        assert_eq!(SyncError::Adapter(AdapterError::Transient("x".into())).http_status(), 502);
        assert_eq!(SyncError::Storage(StorageError::Backend("x".into())).http_status(), 500);
        assert_eq!(SyncError::ShuttingDown.http_status(), 503);
        assert_eq!(SyncError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn test_retry_after_only_on_exhaustion() {
        assert_eq!(SyncError::ResourceExhausted { retry_after_secs: 1 }.retry_after_secs(), Some(1));
        assert_eq!(SyncError::UserNotFound.retry_after_secs(), None);
    }

    #[test]
    fn test_pool_errors_convert() {
        assert!(matches!(
            SyncError::from(PoolError::Timeout(Duration::from_millis(5))),
            SyncError::ResourceExhausted { .. }
        ));
        assert!(matches!(SyncError::from(PoolError::Closed), SyncError::ShuttingDown));
        assert!(matches!(
            SyncError::from(PoolError::Connect(StorageError::Backend("down".into()))),
            SyncError::Storage(_)
        ));
    }

    #[test]
    fn test_kind_distinguishes_adapter_classes() {
        assert_eq!(SyncError::Adapter(AdapterError::Transient("t".into())).kind(), "adapter_transient");
        assert_eq!(SyncError::Adapter(AdapterError::Permanent("p".into())).kind(), "adapter_permanent");
        assert_eq!(SyncError::HandleNotFound(Platform::Codechef).to_string(), "handle not available for codechef");
    }
}
