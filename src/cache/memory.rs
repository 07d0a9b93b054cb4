use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::CacheResult;
use super::{CacheBackend, CacheEntry, CacheStore, Fingerprint};

/// Caching disabled: nothing is ever stored
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl CacheStore for NoCache {
    fn backend(&self) -> CacheBackend {
        CacheBackend::None
    }

    async fn load(&self, _key: &Fingerprint) -> CacheResult<Option<CacheEntry>> {
        Ok(None)
    }

    async fn store(&self, _key: &Fingerprint, _entry: CacheEntry) -> CacheResult<()> {
        Ok(())
    }

    async fn entry_count(&self) -> CacheResult<u64> {
        Ok(0)
    }
}

/// Process-local cache, lost on restart
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    fn backend(&self) -> CacheBackend {
        CacheBackend::Memory
    }

    async fn load(&self, key: &Fingerprint) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.get(key.digest()).map(|entry| entry.value().clone()))
    }

    async fn store(&self, key: &Fingerprint, entry: CacheEntry) -> CacheResult<()> {
        debug!("Cache SET for {} {} ({} bytes)", key.method(), key.url(), entry.payload.len());
        self.entries.insert(key.digest().to_string(), entry);
        Ok(())
    }

    async fn entry_count(&self) -> CacheResult<u64> {
        Ok(self.entries.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::proxy::HeaderPairs;
    use bytes::Bytes;
    use chrono::{Duration, Utc};

    fn key(url: &str) -> Fingerprint {
        Fingerprint::new("GET", url, None, &HeaderPairs::new())
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = InMemoryCache::new();
        let key = key("http://upstream/a");

        cache.set(&key, Bytes::from_static(b"hello")).await.unwrap();
        let cached = cache.get(&key, CachePolicy::forever()).await.unwrap();

        assert_eq!(cached, Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get(&key("http://upstream/a"), CachePolicy::forever()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_entry() {
        let cache = InMemoryCache::new();
        let key = key("http://upstream/a");

        cache.set(&key, Bytes::from_static(b"first")).await.unwrap();
        cache.set(&key, Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(cache.entry_count().await.unwrap(), 1);
        assert_eq!(
            cache.get(&key, CachePolicy::forever()).await.unwrap(),
            Some(Bytes::from_static(b"second"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_one_entry() {
        let cache = std::sync::Arc::new(InMemoryCache::new());

        let writers: Vec<_> = (0..64)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .set(&key("http://upstream/contended"), Bytes::from(format!("writer {}", i)))
                        .await
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        assert_eq!(cache.entry_count().await.unwrap(), 1);
        let stored = cache
            .get(&key("http://upstream/contended"), CachePolicy::forever())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.starts_with(b"writer "));
    }

    #[tokio::test]
    async fn test_staleness_through_get() {
        let cache = InMemoryCache::new();
        let fresh = key("http://upstream/fresh");
        let stale = key("http://upstream/stale");
        let now = Utc::now();

        cache
            .store(&fresh, CacheEntry::stored_at(Bytes::from_static(b"fresh"), now - Duration::seconds(30)))
            .await
            .unwrap();
        cache
            .store(&stale, CacheEntry::stored_at(Bytes::from_static(b"stale"), now - Duration::seconds(61)))
            .await
            .unwrap();

        let policy = CachePolicy::new(60);
        assert_eq!(cache.get(&fresh, policy).await.unwrap(), Some(Bytes::from_static(b"fresh")));
        assert_eq!(cache.get(&stale, policy).await.unwrap(), None);
        assert_eq!(
            cache.get(&stale, CachePolicy::forever()).await.unwrap(),
            Some(Bytes::from_static(b"stale"))
        );
    }

    #[tokio::test]
    async fn test_no_cache_stores_nothing() {
        let cache = NoCache;
        let key = key("http://upstream/a");

        cache.set(&key, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(cache.get(&key, CachePolicy::forever()).await.unwrap(), None);
        assert_eq!(cache.entry_count().await.unwrap(), 0);
    }
}
