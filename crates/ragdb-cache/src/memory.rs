//! In-process cache store using moka.
//!
//! Per-entry TTL via a custom expiry; conditional set is atomic through the
//! entry API.

use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use ragdb_core::traits::CacheStore;
use ragdb_core::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(&self, _key: &String, value: &Entry, _updated_at: Instant, _current: Option<Duration>) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MemoryCacheStore {
    cache: Cache<String, Entry>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).map(|e| e.value))
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_string(), Entry { value, ttl });
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let entry = self
            .cache
            .entry(key.to_string())
            .or_insert_with(|| Entry { value, ttl });
        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryCacheStore::new(100);
        store.set_ex("k", b"v".to_vec(), Duration::from_secs(60)).await.expect("set");
        assert_eq!(store.get("k").await.expect("get"), Some(b"v".to_vec()));
        store.delete("k").await.expect("delete");
        assert_eq!(store.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn entries_expire_individually() {
        let store = MemoryCacheStore::new(100);
        store.set_ex("short", b"1".to_vec(), Duration::from_millis(30)).await.expect("set");
        store.set_ex("long", b"2".to_vec(), Duration::from_secs(60)).await.expect("set");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("short").await.expect("get"), None);
        assert_eq!(store.get("long").await.expect("get"), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn set_nx_only_first_writer_wins() {
        let store = MemoryCacheStore::new(100);
        let ttl = Duration::from_secs(5);
        assert!(store.set_nx("lock", b"a".to_vec(), ttl).await.expect("nx"));
        assert!(!store.set_nx("lock", b"b".to_vec(), ttl).await.expect("nx"));
        assert_eq!(store.get("lock").await.expect("get"), Some(b"a".to_vec()));
        store.delete("lock").await.expect("delete");
        assert!(store.set_nx("lock", b"c".to_vec(), ttl).await.expect("nx"));
    }
}
