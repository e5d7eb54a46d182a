//! Read-through answer cache with two coalescing tiers: an in-process
//! [`SingleFlight`] and a [`DistributedLock`] shared across instances.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::{debug, warn};

use ragdb_core::Result;

use crate::keys::lock_key;
use crate::layered::{LayeredCache, Namespace};
use crate::lock::DistributedLock;
use crate::singleflight::SingleFlight;

pub struct Coalescer<T: Clone> {
    cache: LayeredCache,
    lock: Option<DistributedLock>,
    flight: SingleFlight<T>,
    namespace: Namespace,
}

impl<T> Coalescer<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(cache: LayeredCache, lock: Option<DistributedLock>, namespace: Namespace) -> Self {
        Self { cache, lock, flight: SingleFlight::new(), namespace }
    }

    /// Returns the cached value for `key`, or computes it at most once per
    /// process (and, while the lock holds, once across instances).
    ///
    /// Only successful results are cached. A waiter that never sees the
    /// holder's value computes it itself.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let ns = self.namespace;
        if let Some(hit) = self.cache.get_json::<T>(ns, key).await {
            return Ok(hit);
        }
        let cache = self.cache.clone();
        let lock = self.lock.clone();
        let owned_key = key.to_string();
        self.flight
            .run(key, move || async move {
                let Some(lock) = lock else {
                    let value = compute().await?;
                    cache.put_json(ns, &owned_key, &value).await;
                    return Ok(value);
                };
                match lock.try_acquire(&lock_key(&owned_key)).await {
                    Ok(Some(token)) => {
                        // A previous holder may have finished between our miss and the acquire.
                        let result = match cache.get_json::<T>(ns, &owned_key).await {
                            Some(hit) => Ok(hit),
                            None => compute_and_store(&cache, ns, &owned_key, compute).await,
                        };
                        lock.release(token).await;
                        result
                    }
                    Ok(None) => {
                        debug!(key = %owned_key, "lock held elsewhere; polling cache");
                        if let Some(hit) = cache.poll_json::<T>(ns, &owned_key, lock.poll_attempts(), lock.poll_interval()).await {
                            return Ok(hit);
                        }
                        warn!(key = %owned_key, "lock holder produced no value in time; computing");
                        compute_and_store(&cache, ns, &owned_key, compute).await
                    }
                    Err(e) => {
                        warn!(key = %owned_key, error = %e, "lock unavailable; computing without it");
                        compute_and_store(&cache, ns, &owned_key, compute).await
                    }
                }
            })
            .await
    }
}

async fn compute_and_store<T, F, Fut>(cache: &LayeredCache, ns: Namespace, key: &str, compute: F) -> Result<T>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let value = compute().await?;
    cache.put_json(ns, key, &value).await;
    Ok(value)
}
