// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL user store (SQLite or MySQL through the sqlx `Any` driver).
//!
//! The user document is normalized into four tables:
//!
//! ```sql
//! CREATE TABLE sync_users (
//!   id VARCHAR(24) PRIMARY KEY,
//!   created_at BIGINT NOT NULL,
//!   merge_count BIGINT NOT NULL DEFAULT 0
//! );
//! CREATE TABLE sync_handles    (user_id, platform, handle,    PRIMARY KEY (user_id, platform));
//! CREATE TABLE sync_watermarks (user_id, platform, last_seen, PRIMARY KEY (user_id, platform));
//! CREATE TABLE sync_submissions (
//!   user_id, platform, seq,          -- seq orders the append-only list
//!   name, url, creation_time, status, points, tags, language,
//!   PRIMARY KEY (user_id, platform, seq)
//! );
//! ```
//!
//! Timestamps are stored as epoch nanoseconds so a stored watermark compares
//! equal to the record it came from. Tags are a JSON array in a
//! TEXT column.
//!
//! A merge is one transaction. Its first statement is a write on the user
//! row, so SQLite takes the write lock up front instead of failing a
//! read-to-write upgrade under WAL.
//!
//! ## sqlx Any Driver Quirks
//!
//! MySQL TEXT columns come back as BLOB through `Any`, so text is read as
//! `String` first and `Vec<u8>` second.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Once};
use std::time::Duration;
use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{AnyPool, Row};
use tracing::{debug, info};

use crate::platform::Platform;
use crate::pool::Connector;
use crate::query::{FeedEntry, SubmissionFilter};
use crate::resilience::retry::{retry, RetryConfig};
use crate::submission::{timestamp_from_nanos, timestamp_to_nanos, SubmissionRecord, Timestamp};
use crate::user::{SyncState, UserId, UserRecord};
use super::traits::{StorageError, UserStore};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const SUBMISSION_COLUMNS: &str = "platform, name, url, creation_time, status, points, tags, language";

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

pub struct SqlUserStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlUserStore {
    /// Connect with startup-mode retry (fails fast if config is wrong) and
    /// create the schema if missing.
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(max_connections.max(1))
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(backend)
        })
        .await?;

        let store = Self { pool, is_sqlite };
        if is_sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema().await?;
        info!(sqlite = is_sqlite, "SQL user store ready");
        Ok(store)
    }

    /// WAL lets readers proceed while a merge commits.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;
        Ok(())
    }

    fn schema(&self) -> &'static [&'static str] {
        if self.is_sqlite {
            &[
                "CREATE TABLE IF NOT EXISTS sync_users (
                    id TEXT PRIMARY KEY,
                    created_at INTEGER NOT NULL,
                    merge_count INTEGER NOT NULL DEFAULT 0
                )",
                "CREATE TABLE IF NOT EXISTS sync_handles (
                    user_id TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    handle TEXT NOT NULL,
                    PRIMARY KEY (user_id, platform)
                )",
                "CREATE TABLE IF NOT EXISTS sync_watermarks (
                    user_id TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    last_seen INTEGER NOT NULL,
                    PRIMARY KEY (user_id, platform)
                )",
                "CREATE TABLE IF NOT EXISTS sync_submissions (
                    user_id TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    creation_time INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    points REAL NOT NULL DEFAULT 0,
                    tags TEXT NOT NULL,
                    language TEXT,
                    PRIMARY KEY (user_id, platform, seq)
                )",
                "CREATE INDEX IF NOT EXISTS idx_sync_submissions_time
                    ON sync_submissions (user_id, creation_time)",
            ]
        } else {
            &[
                "CREATE TABLE IF NOT EXISTS sync_users (
                    id VARCHAR(24) PRIMARY KEY,
                    created_at BIGINT NOT NULL,
                    merge_count BIGINT NOT NULL DEFAULT 0
                )",
                "CREATE TABLE IF NOT EXISTS sync_handles (
                    user_id VARCHAR(24) NOT NULL,
                    platform VARCHAR(16) NOT NULL,
                    handle VARCHAR(255) NOT NULL,
                    PRIMARY KEY (user_id, platform)
                )",
                "CREATE TABLE IF NOT EXISTS sync_watermarks (
                    user_id VARCHAR(24) NOT NULL,
                    platform VARCHAR(16) NOT NULL,
                    last_seen BIGINT NOT NULL,
                    PRIMARY KEY (user_id, platform)
                )",
                "CREATE TABLE IF NOT EXISTS sync_submissions (
                    user_id VARCHAR(24) NOT NULL,
                    platform VARCHAR(16) NOT NULL,
                    seq BIGINT NOT NULL,
                    name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    creation_time BIGINT NOT NULL,
                    status VARCHAR(64) NOT NULL,
                    points DOUBLE NOT NULL DEFAULT 0,
                    tags TEXT NOT NULL,
                    language VARCHAR(128),
                    PRIMARY KEY (user_id, platform, seq),
                    INDEX idx_sync_submissions_time (user_id, creation_time)
                )",
            ]
        }
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        for sql in self.schema() {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql).execute(&self.pool).await.map_err(backend)
            })
            .await?;
        }
        Ok(())
    }

    fn upsert_watermark_sql(&self) -> &'static str {
        if self.is_sqlite {
            "INSERT INTO sync_watermarks (user_id, platform, last_seen) VALUES (?, ?, ?)
             ON CONFLICT(user_id, platform) DO UPDATE SET last_seen = MAX(last_seen, excluded.last_seen)"
        } else {
            "INSERT INTO sync_watermarks (user_id, platform, last_seen) VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE last_seen = GREATEST(last_seen, VALUES(last_seen))"
        }
    }

    fn insert_user_sql(&self) -> &'static str {
        if self.is_sqlite {
            "INSERT INTO sync_users (id, created_at) VALUES (?, ?) ON CONFLICT(id) DO NOTHING"
        } else {
            "INSERT IGNORE INTO sync_users (id, created_at) VALUES (?, ?)"
        }
    }

    fn upsert_handle_sql(&self) -> &'static str {
        if self.is_sqlite {
            "INSERT INTO sync_handles (user_id, platform, handle) VALUES (?, ?, ?)
             ON CONFLICT(user_id, platform) DO UPDATE SET handle = excluded.handle"
        } else {
            "INSERT INTO sync_handles (user_id, platform, handle) VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE handle = VALUES(handle)"
        }
    }

    async fn user_exists(&self, id: &UserId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 AS present FROM sync_users WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.is_some())
    }

    /// Append `records` after the current tail of the platform list.
    async fn insert_records(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Any>,
        id: &UserId,
        platform: Platform,
        records: &[SubmissionRecord],
    ) -> Result<(), StorageError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(seq), -1) + 1 AS next_seq FROM sync_submissions WHERE user_id = ? AND platform = ?",
        )
        .bind(id.as_str())
        .bind(platform.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(backend)?;
        let mut seq: i64 = row.try_get("next_seq").map_err(backend)?;

        for record in records {
            let tags = serde_json::to_string(&record.tags)
                .map_err(|e| StorageError::Backend(format!("Failed to encode tags: {}", e)))?;
            sqlx::query(
                "INSERT INTO sync_submissions
                    (user_id, platform, seq, name, url, creation_time, status, points, tags, language)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.as_str())
            .bind(platform.as_str())
            .bind(seq)
            .bind(&record.name)
            .bind(&record.url)
            .bind(encode_time(&record.creation_time)?)
            .bind(&record.status)
            .bind(record.points)
            .bind(tags)
            .bind(record.language.clone())
            .execute(&mut **tx)
            .await
            .map_err(backend)?;
            seq += 1;
        }
        Ok(())
    }

    async fn fetch_records<'q>(
        &self,
        id: &UserId,
        query: Query<'q, sqlx::Any, AnyArguments<'q>>,
    ) -> Result<Vec<(Platform, SubmissionRecord)>, StorageError> {
        let rows = query.fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(|row| decode_submission(id, row)).collect()
    }
}

fn text(row: &AnyRow, col: &str) -> Result<String, StorageError> {
    match row.try_get::<String, _>(col) {
        Ok(s) => Ok(s),
        Err(_) => {
            let bytes: Vec<u8> = row.try_get(col).map_err(backend)?;
            String::from_utf8(bytes).map_err(|e| StorageError::Backend(format!("Column {} is not UTF-8: {}", col, e)))
        }
    }
}

fn opt_text(row: &AnyRow, col: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(col).ok().flatten().or_else(|| {
        row.try_get::<Option<Vec<u8>>, _>(col)
            .ok()
            .flatten()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    })
}

fn corruption(id: &UserId, detail: impl Into<String>) -> StorageError {
    StorageError::Corruption {
        id: id.to_string(),
        detail: detail.into(),
    }
}

fn decode_platform(id: &UserId, raw: &str) -> Result<Platform, StorageError> {
    Platform::from_str(raw).map_err(|_| corruption(id, format!("unknown platform '{}'", raw)))
}

fn encode_time(ts: &Timestamp) -> Result<i64, StorageError> {
    timestamp_to_nanos(ts).ok_or_else(|| StorageError::Backend(format!("timestamp out of storable range: {}", ts)))
}

fn decode_submission(id: &UserId, row: &AnyRow) -> Result<(Platform, SubmissionRecord), StorageError> {
    let platform = decode_platform(id, &text(row, "platform")?)?;
    let creation_time = timestamp_from_nanos(row.try_get("creation_time").map_err(backend)?);
    let tags: Vec<String> = serde_json::from_str(&text(row, "tags")?)
        .map_err(|e| corruption(id, format!("bad tags: {}", e)))?;

    let mut record = SubmissionRecord::new(text(row, "name")?, text(row, "url")?, creation_time, text(row, "status")?)
        .with_points(row.try_get("points").map_err(backend)?)
        .with_tags(tags);
    if let Some(language) = opt_text(row, "language") {
        record = record.with_language(language);
    }
    Ok((platform, record))
}

#[async_trait]
impl UserStore for SqlUserStore {
    async fn sync_state(&self, id: &UserId, platform: Platform) -> Result<Option<SyncState>, StorageError> {
        let row = sqlx::query(
            "SELECT u.id AS id, h.handle AS handle, w.last_seen AS last_seen
             FROM sync_users u
             LEFT JOIN sync_handles h ON h.user_id = u.id AND h.platform = ?
             LEFT JOIN sync_watermarks w ON w.user_id = u.id AND w.platform = ?
             WHERE u.id = ?",
        )
        .bind(platform.as_str())
        .bind(platform.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else { return Ok(None) };
        let watermark = row
            .try_get::<Option<i64>, _>("last_seen")
            .map_err(backend)?
            .map(timestamp_from_nanos);
        Ok(Some(SyncState {
            handle: opt_text(&row, "handle"),
            watermark,
        }))
    }

    #[tracing::instrument(skip(self, records), fields(user_id = %id, platform = %platform, count = records.len()))]
    async fn merge_submissions(
        &self,
        id: &UserId,
        platform: Platform,
        records: &[SubmissionRecord],
        watermark: Timestamp,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let touched = sqlx::query("UPDATE sync_users SET merge_count = merge_count + 1 WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if touched.rows_affected() == 0 {
            tx.rollback().await.map_err(backend)?;
            return Err(StorageError::NotFound);
        }

        sqlx::query(self.upsert_watermark_sql())
            .bind(id.as_str())
            .bind(platform.as_str())
            .bind(encode_time(&watermark)?)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        self.insert_records(&mut tx, id, platform, records).await?;
        tx.commit().await.map_err(backend)?;
        debug!("Merge committed");
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>, StorageError> {
        if !self.user_exists(id).await? {
            return Ok(None);
        }
        let mut user = UserRecord::new(id.clone());

        let handles = sqlx::query("SELECT platform, handle FROM sync_handles WHERE user_id = ?")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        for row in &handles {
            user.handles.insert(decode_platform(id, &text(row, "platform")?)?, text(row, "handle")?);
        }

        let watermarks = sqlx::query("SELECT platform, last_seen FROM sync_watermarks WHERE user_id = ?")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        for row in &watermarks {
            let platform = decode_platform(id, &text(row, "platform")?)?;
            user.watermarks.insert(platform, timestamp_from_nanos(row.try_get("last_seen").map_err(backend)?));
        }

        user.submissions = self.all_submissions(id).await?.unwrap_or_default();
        Ok(Some(user))
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StorageError> {
        let id = &user.id;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(self.insert_user_sql())
            .bind(id.as_str())
            .bind(encode_time(&chrono::Utc::now())?)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for table in ["sync_handles", "sync_watermarks", "sync_submissions"] {
            sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", table))
                .bind(id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        for (platform, handle) in &user.handles {
            sqlx::query(self.upsert_handle_sql())
                .bind(id.as_str())
                .bind(platform.as_str())
                .bind(handle.as_str())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        for (platform, watermark) in &user.watermarks {
            sqlx::query(self.upsert_watermark_sql())
                .bind(id.as_str())
                .bind(platform.as_str())
                .bind(encode_time(watermark)?)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        for (platform, records) in &user.submissions {
            self.insert_records(&mut tx, id, *platform, records).await?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn set_handle(&self, id: &UserId, platform: Platform, handle: &str) -> Result<(), StorageError> {
        if !self.user_exists(id).await? {
            return Err(StorageError::NotFound);
        }
        let query = if handle.is_empty() {
            sqlx::query("DELETE FROM sync_handles WHERE user_id = ? AND platform = ?")
                .bind(id.as_str())
                .bind(platform.as_str())
        } else {
            sqlx::query(self.upsert_handle_sql())
                .bind(id.as_str())
                .bind(platform.as_str())
                .bind(handle)
        };
        query.execute(&self.pool).await.map_err(backend)?;
        Ok(())
    }

    async fn filter_submissions(
        &self,
        id: &UserId,
        platform: Platform,
        filter: &SubmissionFilter,
    ) -> Result<Option<Vec<SubmissionRecord>>, StorageError> {
        if !self.user_exists(id).await? {
            return Ok(None);
        }
        let status = filter.status.clone();
        let sql = format!(
            "SELECT {} FROM sync_submissions WHERE user_id = ? AND platform = ?{} ORDER BY seq",
            SUBMISSION_COLUMNS,
            if status.is_some() { " AND status = ?" } else { "" }
        );
        let mut query = sqlx::query(&sql).bind(id.as_str()).bind(platform.as_str());
        if let Some(status) = status {
            query = query.bind(status);
        }
        let rows = self.fetch_records(id, query).await?;
        // Tag membership is checked here; tags live in a JSON column.
        Ok(Some(rows.into_iter().map(|(_, r)| r).filter(|r| filter.matches(r)).collect()))
    }

    async fn submissions_before(
        &self,
        id: &UserId,
        before: Timestamp,
        limit: usize,
    ) -> Result<Option<Vec<FeedEntry>>, StorageError> {
        if !self.user_exists(id).await? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {} FROM sync_submissions WHERE user_id = ? AND creation_time < ?
             ORDER BY creation_time DESC, platform, seq LIMIT ?",
            SUBMISSION_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        // Outside the storable range the cutoff saturates.
        let cutoff = timestamp_to_nanos(&before).unwrap_or(if before.timestamp() < 0 { i64::MIN } else { i64::MAX });
        let query = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(cutoff)
            .bind(limit);
        let rows = self.fetch_records(id, query).await?;
        Ok(Some(rows.into_iter().map(|(platform, record)| FeedEntry { platform, record }).collect()))
    }

    async fn all_submissions(
        &self,
        id: &UserId,
    ) -> Result<Option<BTreeMap<Platform, Vec<SubmissionRecord>>>, StorageError> {
        if !self.user_exists(id).await? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {} FROM sync_submissions WHERE user_id = ? ORDER BY platform, seq",
            SUBMISSION_COLUMNS
        );
        let rows = self.fetch_records(id, sqlx::query(&sql).bind(id.as_str())).await?;
        let mut all: BTreeMap<Platform, Vec<SubmissionRecord>> = BTreeMap::new();
        for (platform, record) in rows {
            all.entry(platform).or_default().push(record);
        }
        Ok(Some(all))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(backend)?;
        Ok(())
    }
}

/// [`Connector`] that opens a fresh [`SqlUserStore`] on every call.
pub struct SqlConnector {
    url: String,
    max_connections: u32,
}

impl SqlConnector {
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
        }
    }
}

#[async_trait]
impl Connector for SqlConnector {
    async fn connect(&self) -> Result<Arc<dyn UserStore>, StorageError> {
        Ok(Arc::new(SqlUserStore::connect(&self.url, self.max_connections).await?))
    }
}
