//! Redis-backed cache store, shared by every replica pointing at the same URL.
//!
//! The connection is established on first use and re-established by the
//! connection manager afterwards. Every failure surfaces as [`Error::Cache`],
//! which the cache tiers treat as a miss.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, Script};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use ragdb_core::traits::CacheStore;
use ragdb_core::{Error, Result};

const DELETE_IF_EQ: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

pub struct RedisCacheStore {
    client: Client,
    timeout: Duration,
    conn: OnceCell<ConnectionManager>,
    delete_if_eq: Script,
}

fn cache_err(err: impl std::fmt::Display) -> Error {
    Error::Cache(err.to_string())
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisCacheStore {
    /// Parses `url`; no connection is made until the first command.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::open(url).map_err(|e| Error::Configuration(format!("cache.url: {e}")))?;
        Ok(Self { client, timeout, conn: OnceCell::new(), delete_if_eq: Script::new(DELETE_IF_EQ) })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(1)
                    .set_connection_timeout(self.timeout)
                    .set_response_timeout(self.timeout);
                let conn = ConnectionManager::new_with_config(self.client.clone(), config).await.map_err(cache_err)?;
                debug!("connected to shared cache");
                Ok::<_, Error>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(cache_err)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await.map_err(cache_err)?;
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = self
            .delete_if_eq
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(removed > 0)
    }
}
