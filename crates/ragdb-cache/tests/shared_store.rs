use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ragdb_cache::{Coalescer, DistributedLock, LayeredCache, Namespace, RedisCacheStore, Ttls};
use ragdb_core::config::CacheSettings;
use ragdb_core::traits::CacheStore;
use ragdb_core::Error;

const UNREACHABLE: &str = "redis://127.0.0.1:1/";

fn settings(url: &str) -> CacheSettings {
    CacheSettings { url: url.into(), timeout_ms: 200, lock_poll_attempts: 20, lock_poll_interval_ms: 10, ..CacheSettings::default() }
}

/// Set `RAGDB_TEST_REDIS_URL` to run the cross-instance checks against a live server.
fn live_url() -> Option<String> {
    std::env::var("RAGDB_TEST_REDIS_URL").ok().filter(|u| !u.trim().is_empty())
}

#[tokio::test]
async fn unreachable_server_reports_cache_errors() {
    let store = RedisCacheStore::new(UNREACHABLE, Duration::from_millis(200)).expect("url");
    assert!(matches!(store.get("k").await, Err(Error::Cache(_))));
    assert!(matches!(store.set_nx("lock:k", b"t".to_vec(), Duration::from_secs(1)).await, Err(Error::Cache(_))));
}

#[tokio::test]
async fn unreachable_server_degrades_to_direct_compute() -> anyhow::Result<()> {
    let (cache, lock) = ragdb_cache::from_settings(&settings(UNREACHABLE))?;
    assert!(lock.is_some());
    let co = Coalescer::new(cache, lock, Namespace::Answer);
    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let calls = calls.clone();
        let v: String = co
            .get_or_compute("answer:shared", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            })
            .await?;
        assert_eq!(v, "fresh");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn lock_is_exclusive_across_store_instances() -> anyhow::Result<()> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let cfg = settings(&url);
    let a = DistributedLock::new(Arc::new(RedisCacheStore::new(&url, cfg.timeout())?), &cfg);
    let b = DistributedLock::new(Arc::new(RedisCacheStore::new(&url, cfg.timeout())?), &cfg);
    let key = format!("lock:ragdb-test:{}", std::process::id());

    let held = a.try_acquire(&key).await?.expect("first holder");
    assert!(b.try_acquire(&key).await?.is_none());
    a.release(held).await;
    let taken = b.try_acquire(&key).await?.expect("free after release");
    b.release(taken).await;
    Ok(())
}

#[tokio::test]
async fn cached_values_are_visible_to_other_instances() -> anyhow::Result<()> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let cfg = settings(&url);
    let writer = LayeredCache::new(Arc::new(RedisCacheStore::new(&url, cfg.timeout())?), Ttls::default());
    let reader = LayeredCache::new(Arc::new(RedisCacheStore::new(&url, cfg.timeout())?), Ttls::default());
    let key = format!("retr:ragdb-test:{}", std::process::id());

    writer.put_json(Namespace::Retrieval, &key, &vec![1_u32, 2, 3]).await;
    let seen: Option<Vec<u32>> = reader.get_json(Namespace::Retrieval, &key).await;
    assert_eq!(seen, Some(vec![1, 2, 3]));
    Ok(())
}
