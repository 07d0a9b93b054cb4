use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, error, info};

use crate::error::{CacheError, CacheResult};
use super::{CacheBackend, CacheEntry, CacheStore, Fingerprint};

const TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    body BLOB NULL,
    headers TEXT NOT NULL,
    response BLOB NOT NULL,
    stored_at INTEGER NOT NULL,

    UNIQUE (fingerprint)
)
"#;

const SELECT_SQL: &str = "SELECT response, stored_at FROM cache WHERE fingerprint = ?";

const UPSERT_SQL: &str = r#"
INSERT INTO cache (fingerprint, method, url, body, headers, response, stored_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (fingerprint) DO UPDATE SET
    response = excluded.response,
    stored_at = excluded.stored_at
"#;

/// Single-file cache backed by SQLite.
///
/// If the database cannot be opened or its schema created, the instance logs
/// once and behaves like a disabled cache for the rest of the process.
pub struct SqliteCache {
    path: PathBuf,
    pool: Option<SqlitePool>,
}

impl SqliteCache {
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let pool = match Self::connect(&path).await {
            Ok(pool) => {
                info!("SQLite cache ready at {}", path.display());
                Some(pool)
            }
            Err(e) => {
                error!("Error while initializing cache, caching disabled: {}", e);
                None
            }
        };

        Self { path, pool }
    }

    async fn connect(path: &Path) -> CacheResult<SqlitePool> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::init("sqlite", format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::init("sqlite", e))?;

        sqlx::query(TABLE_SQL)
            .execute(&pool)
            .await
            .map_err(|e| CacheError::init("sqlite", e))?;

        Ok(pool)
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    fn backend(&self) -> CacheBackend {
        CacheBackend::Sqlite
    }

    async fn load(&self, key: &Fingerprint) -> CacheResult<Option<CacheEntry>> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let Some(row) = sqlx::query(SELECT_SQL)
            .bind(key.digest())
            .fetch_optional(pool)
            .await?
        else {
            return Ok(None);
        };

        let response: Vec<u8> = row.try_get("response")?;
        let stored_at: i64 = row.try_get("stored_at")?;
        let stored_at = DateTime::from_timestamp_micros(stored_at)
            .ok_or_else(|| CacheError::CorruptEntry(format!("timestamp {} out of range", stored_at)))?;

        Ok(Some(CacheEntry::stored_at(Bytes::from(response), stored_at)))
    }

    async fn store(&self, key: &Fingerprint, entry: CacheEntry) -> CacheResult<()> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        sqlx::query(UPSERT_SQL)
            .bind(key.digest())
            .bind(key.method())
            .bind(key.url())
            .bind(key.body())
            .bind(key.headers())
            .bind(entry.payload.as_ref())
            .bind(entry.stored_at.timestamp_micros())
            .execute(pool)
            .await?;

        debug!("Cache SET for {} {} in {}", key.method(), key.url(), self.path.display());
        Ok(())
    }

    async fn entry_count(&self) -> CacheResult<u64> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache")
            .fetch_one(pool)
            .await?;
        Ok(count as u64)
    }
}
