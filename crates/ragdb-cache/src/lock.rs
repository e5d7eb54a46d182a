//! Best-effort cross-instance lock on top of a [`CacheStore`] conditional set.
//!
//! Not a fencing lock: the holder may outlive the TTL, after which a second
//! caller can acquire and recompute. Callers treat it as a hint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use ragdb_core::config::CacheSettings;
use ragdb_core::traits::CacheStore;
use ragdb_core::Result;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Proof of acquisition; hand it back to [`DistributedLock::release`].
#[derive(Debug)]
pub struct LockToken {
    key: String,
    token: String,
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CacheStore>, cfg: &CacheSettings) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(cfg.lock_ttl_secs.max(1)),
            poll_attempts: cfg.lock_poll_attempts,
            poll_interval: Duration::from_millis(cfg.lock_poll_interval_ms),
        }
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns `None` when another holder has the key.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockToken>> {
        let token = format!("{}-{}", std::process::id(), NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        if self.store.set_nx(key, token.clone().into_bytes(), self.ttl).await? {
            debug!(key, "lock acquired");
            Ok(Some(LockToken { key: key.to_string(), token }))
        } else {
            Ok(None)
        }
    }

    /// Deletes the key if it still carries our token. Failures are logged.
    pub async fn release(&self, lock: LockToken) {
        match self.store.delete_if_eq(&lock.key, lock.token.as_bytes()).await {
            Ok(true) => debug!(key = %lock.key, "lock released"),
            Ok(false) => debug!(key = %lock.key, "lock expired before release"),
            Err(e) => warn!(key = %lock.key, error = %e, "lock release failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCacheStore;

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let store = Arc::new(MemoryCacheStore::new(100));
        let lock = DistributedLock::new(store, &CacheSettings::default());
        let held = lock.try_acquire("lock:a").await.expect("acquire").expect("free");
        assert!(lock.try_acquire("lock:a").await.expect("acquire").is_none());
        lock.release(held).await;
        assert!(lock.try_acquire("lock:a").await.expect("acquire").is_some());
    }

    #[tokio::test]
    async fn stale_token_does_not_release_new_holder() {
        let store = Arc::new(MemoryCacheStore::new(100));
        let lock = DistributedLock::new(store.clone(), &CacheSettings::default());
        let stale = lock.try_acquire("lock:b").await.expect("acquire").expect("free");
        // Simulate expiry and takeover by another instance.
        store.delete("lock:b").await.expect("delete");
        let _current = lock.try_acquire("lock:b").await.expect("acquire").expect("free");
        lock.release(stale).await;
        assert!(lock.try_acquire("lock:b").await.expect("acquire").is_none());
    }
}
