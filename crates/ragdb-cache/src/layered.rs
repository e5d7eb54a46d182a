//! Namespaced TTL tiers over a [`CacheStore`]. Store failures degrade to
//! misses and are only logged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use ragdb_core::config::CacheSettings;
use ragdb_core::traits::CacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Retrieval,
    Rerank,
    Answer,
}

impl Namespace {
    pub fn label(self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::Rerank => "rerank",
            Self::Answer => "answer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttls {
    pub retrieval: Duration,
    pub rerank: Duration,
    pub answer: Duration,
}

impl Default for Ttls {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for Ttls {
    fn from(cfg: &CacheSettings) -> Self {
        Self {
            retrieval: Duration::from_secs(cfg.retrieval_ttl_secs),
            rerank: Duration::from_secs(cfg.rerank_ttl_secs),
            answer: Duration::from_secs(cfg.answer_ttl_secs),
        }
    }
}

#[derive(Clone)]
pub struct LayeredCache {
    store: Option<Arc<dyn CacheStore>>,
    ttls: Ttls,
}

impl LayeredCache {
    pub fn new(store: Arc<dyn CacheStore>, ttls: Ttls) -> Self {
        Self { store: Some(store), ttls }
    }

    /// Every lookup misses and every write is dropped.
    pub fn disabled() -> Self {
        Self { store: None, ttls: Ttls::default() }
    }

    pub fn ttl(&self, ns: Namespace) -> Duration {
        match ns {
            Namespace::Retrieval => self.ttls.retrieval,
            Namespace::Rerank => self.ttls.rerank,
            Namespace::Answer => self.ttls.answer,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(v) => {
                    debug!(namespace = ns.label(), "cache hit");
                    Some(v)
                }
                Err(e) => {
                    warn!(namespace = ns.label(), error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(namespace = ns.label(), error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, ns: Namespace, key: &str, value: &T) {
        let Some(store) = self.store.as_ref() else { return };
        let bytes = match serde_json::to_vec(value) {
            Ok(b) => b,
            Err(e) => {
                warn!(namespace = ns.label(), error = %e, "cache value not serialisable");
                return;
            }
        };
        if let Err(e) = store.set_ex(key, bytes, self.ttl(ns)).await {
            warn!(namespace = ns.label(), error = %e, "cache write failed");
        }
    }

    /// Re-reads `key` up to `attempts` times, sleeping `interval` between reads.
    pub async fn poll_json<T: DeserializeOwned>(&self, ns: Namespace, key: &str, attempts: u32, interval: Duration) -> Option<T> {
        for attempt in 0..attempts {
            if let Some(v) = self.get_json(ns, key).await {
                debug!(namespace = ns.label(), attempt, "value appeared while waiting on lock");
                return Some(v);
            }
            tokio::time::sleep(interval).await;
        }
        None
    }
}
