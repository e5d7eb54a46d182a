//! Cache tiers, request coalescing and the best-effort distributed lock used
//! by the retrieval pipeline.

pub mod coalesce;
pub mod keys;
pub mod layered;
pub mod lock;
pub mod memory;
pub mod shared;
pub mod singleflight;

pub use coalesce::Coalescer;
pub use layered::{LayeredCache, Namespace, Ttls};
pub use lock::{DistributedLock, LockToken};
pub use memory::MemoryCacheStore;
pub use shared::RedisCacheStore;
pub use singleflight::SingleFlight;

use std::sync::Arc;

use tracing::info;

use ragdb_core::config::CacheSettings;
use ragdb_core::traits::CacheStore;
use ragdb_core::Result;

/// Cache and lock wired from settings. A disabled cache has no lock either.
/// With `cache.url` set both live in Redis; otherwise they are in-process.
pub fn from_settings(cfg: &CacheSettings) -> Result<(LayeredCache, Option<DistributedLock>)> {
    if !cfg.enabled {
        return Ok((LayeredCache::disabled(), None));
    }
    let store: Arc<dyn CacheStore> = match cfg.shared_url() {
        Some(url) => {
            info!("using shared cache store");
            Arc::new(RedisCacheStore::new(url, cfg.timeout())?)
        }
        None => Arc::new(MemoryCacheStore::new(cfg.max_entries)),
    };
    Ok((LayeredCache::new(store.clone(), Ttls::from(cfg)), Some(DistributedLock::new(store, cfg))))
}
