// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends for user documents.
//!
//! - [`memory::InMemoryUserStore`]: DashMap-backed, for tests and single-process use
//! - [`sql::SqlUserStore`]: SQLite/MySQL through the sqlx `Any` driver

pub mod traits;
pub mod memory;
pub mod sql;

pub use traits::{StorageError, UserStore};
