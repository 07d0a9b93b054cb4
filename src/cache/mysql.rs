use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use tracing::{debug, error, info};

use crate::config::MySqlCredentials;
use crate::error::{CacheError, CacheResult};
use super::{CacheBackend, CacheEntry, CacheStore, Fingerprint};

const TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    fingerprint CHAR(64) NOT NULL,
    method VARCHAR(16) NOT NULL,
    url TEXT NOT NULL,
    body BLOB NULL,
    headers TEXT NOT NULL,
    response MEDIUMBLOB NOT NULL,
    stored_at BIGINT NOT NULL,
    UNIQUE KEY cache_fingerprint (fingerprint)
)
"#;

const SELECT_SQL: &str = "SELECT response, stored_at FROM cache WHERE fingerprint = ?";

const UPSERT_SQL: &str = r#"
INSERT INTO cache (fingerprint, method, url, body, headers, response, stored_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON DUPLICATE KEY UPDATE
    response = VALUES(response),
    stored_at = VALUES(stored_at)
"#;

/// Cache persisted in a remote MySQL database.
///
/// Connections come from a pool and are held only for the duration of one
/// statement. An unreachable server at startup disables the instance.
pub struct MySqlCache {
    pool: Option<MySqlPool>,
}

impl MySqlCache {
    pub async fn connect(credentials: &MySqlCredentials) -> Self {
        let pool = match Self::create_pool(credentials).await {
            Ok(pool) => {
                info!(
                    "MySQL cache ready at {}:{}/{}",
                    credentials.host, credentials.port, credentials.database
                );
                Some(pool)
            }
            Err(e) => {
                error!("Error while initializing cache, caching disabled: {}", e);
                None
            }
        };

        Self { pool }
    }

    async fn create_pool(credentials: &MySqlCredentials) -> CacheResult<MySqlPool> {
        let options = MySqlConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .username(&credentials.user)
            .password(&credentials.password)
            .database(&credentials.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| CacheError::init("mysql", e))?;

        sqlx::query(TABLE_SQL)
            .execute(&pool)
            .await
            .map_err(|e| CacheError::init("mysql", e))?;

        Ok(pool)
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }
}

#[async_trait]
impl CacheStore for MySqlCache {
    fn backend(&self) -> CacheBackend {
        CacheBackend::MySql
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

        debug!("Cache SET for {} {} in MySQL", key.method(), key.url());
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
