pub mod fingerprint;
pub mod memory;
pub mod mysql;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::{CacheConfig, CacheMode};
use crate::error::CacheResult;

pub use fingerprint::Fingerprint;
pub use memory::{InMemoryCache, NoCache};
pub use mysql::MySqlCache;
pub use sqlite::SqliteCache;

/// Stored response body and the moment it was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            stored_at: Utc::now(),
        }
    }

    pub fn stored_at(payload: Bytes, stored_at: DateTime<Utc>) -> Self {
        Self { payload, stored_at }
    }
}

/// Staleness window requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age_seconds: i64,
}

impl CachePolicy {
    pub fn new(max_age_seconds: i64) -> Self {
        Self { max_age_seconds }
    }

    /// Entries never go stale
    pub fn forever() -> Self {
        Self::new(0)
    }

    /// `max_age <= 0` accepts any entry. Otherwise the entry's age must lie
    /// strictly between zero and `max_age`; an age of exactly zero is a miss.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        if self.max_age_seconds <= 0 {
            return true;
        }

        let age = now.signed_duration_since(entry.stored_at);
        if age <= Duration::zero() {
            return false;
        }

        // Windows too large for a duration have no upper bound
        match Duration::try_seconds(self.max_age_seconds) {
            Some(max_age) => age < max_age,
            None => true,
        }
    }
}

/// Which backend variant a store is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    None,
    Memory,
    Sqlite,
    MySql,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::None => "none",
            CacheBackend::Memory => "memory",
            CacheBackend::Sqlite => "sqlite",
            CacheBackend::MySql => "mysql",
        }
    }
}

/// Uniform contract over all cache backends.
///
/// Backends implement raw `load`/`store`; staleness is applied once, in `get`.
/// `store` must be an atomic upsert: one entry per fingerprint, last writer wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> CacheBackend;

    async fn load(&self, key: &Fingerprint) -> CacheResult<Option<CacheEntry>>;

    async fn store(&self, key: &Fingerprint, entry: CacheEntry) -> CacheResult<()>;

    /// Number of stored entries
    async fn entry_count(&self) -> CacheResult<u64>;

    async fn get(&self, key: &Fingerprint, policy: CachePolicy) -> CacheResult<Option<Bytes>> {
        let Some(entry) = self.load(key).await? else {
            return Ok(None);
        };

        if policy.is_fresh(&entry, Utc::now()) {
            Ok(Some(entry.payload))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &Fingerprint, payload: Bytes) -> CacheResult<()> {
        self.store(key, CacheEntry::new(payload)).await
    }
}

/// Build the configured backend. Never fails: incomplete settings and
/// initialization errors both end in a store that caches nothing.
pub async fn build_cache_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    let store: Arc<dyn CacheStore> = match config.mode {
        CacheMode::None => Arc::new(NoCache),
        CacheMode::Memory => Arc::new(InMemoryCache::new()),
        CacheMode::EmbeddedFile => Arc::new(SqliteCache::open(&config.sqlite_file).await),
        CacheMode::RelationalRemote => match config.mysql.credentials() {
            Some(credentials) => Arc::new(MySqlCache::connect(&credentials).await),
            None => {
                warn!("MySQL cache provider is not fully configured, falling back to no caching");
                Arc::new(NoCache)
            }
        },
    };

    info!("Using cache provider: {}", store.backend().as_str());
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MySqlConfig;

    fn entry_aged(seconds: i64) -> (CacheEntry, DateTime<Utc>) {
        let now = Utc::now();
        let entry = CacheEntry::stored_at(Bytes::from_static(b"payload"), now - Duration::seconds(seconds));
        (entry, now)
    }

    #[test]
    fn test_staleness_window() {
        let policy = CachePolicy::new(60);

        let (entry, now) = entry_aged(30);
        assert!(policy.is_fresh(&entry, now));

        let (entry, now) = entry_aged(61);
        assert!(!policy.is_fresh(&entry, now));

        let (entry, now) = entry_aged(60);
        assert!(!policy.is_fresh(&entry, now));
    }

    #[test]
    fn test_zero_age_is_a_miss() {
        let (entry, now) = entry_aged(0);
        assert!(!CachePolicy::new(60).is_fresh(&entry, now));
        assert!(CachePolicy::forever().is_fresh(&entry, now));
    }

    #[test]
    fn test_future_timestamp_is_a_miss() {
        let (entry, now) = entry_aged(-5);
        assert!(!CachePolicy::new(60).is_fresh(&entry, now));
    }

    #[test]
    fn test_long_windows_are_not_day_truncated() {
        let policy = CachePolicy::new(3 * 86_400);

        let (entry, now) = entry_aged(2 * 86_400 + 10);
        assert!(policy.is_fresh(&entry, now));

        let (entry, now) = entry_aged(3 * 86_400 + 10);
        assert!(!policy.is_fresh(&entry, now));
    }

    #[test]
    fn test_huge_max_age_is_unbounded() {
        let policy = CachePolicy::new(10_000_000_000_000_000);

        let (entry, now) = entry_aged(10 * 365 * 86_400);
        assert!(policy.is_fresh(&entry, now));
        assert!(CachePolicy::new(i64::MAX).is_fresh(&entry, now));

        let (entry, now) = entry_aged(0);
        assert!(!policy.is_fresh(&entry, now));
        let (entry, now) = entry_aged(-5);
        assert!(!CachePolicy::new(i64::MAX).is_fresh(&entry, now));
    }

    #[test]
    fn test_negative_max_age_accepts_everything() {
        let (entry, now) = entry_aged(10 * 86_400);
        assert!(CachePolicy::new(-1).is_fresh(&entry, now));
    }

    #[tokio::test]
    async fn test_factory_selects_backend() {
        let config = CacheConfig {
            mode: CacheMode::None,
            ..CacheConfig::default()
        };
        assert_eq!(build_cache_store(&config).await.backend(), CacheBackend::None);

        let config = CacheConfig::default();
        assert_eq!(build_cache_store(&config).await.backend(), CacheBackend::Memory);
    }

    #[tokio::test]
    async fn test_incomplete_mysql_settings_fall_back_to_none() {
        let config = CacheConfig {
            mode: CacheMode::RelationalRemote,
            mysql: MySqlConfig {
                host: Some("db.internal".into()),
                ..MySqlConfig::default()
            },
            ..CacheConfig::default()
        };

        let store = build_cache_store(&config).await;
        assert_eq!(store.backend(), CacheBackend::None);
    }
}
