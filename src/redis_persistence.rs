//! Redis-backed remote tier

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::{AsyncCommands, Commands, RedisError, aio::ConnectionManager};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{CacheError, RemotePersistence};

/// [`RemotePersistence`] over a single Redis instance.
///
/// Blocking calls share one lazily opened connection that is re-opened after
/// an I/O failure. Async calls go through a lazily created
/// [`ConnectionManager`], which reconnects on its own.
pub struct RedisPersistence {
    client: redis::Client,
    blocking: Mutex<Option<redis::Connection>>,
    manager: OnceCell<ConnectionManager>,
}

impl RedisPersistence {
    /// Parse `connection_string` without connecting yet.
    pub fn open(connection_string: &str) -> Result<Self, CacheError> {
        Ok(Self::from_client(redis::Client::open(connection_string)?))
    }

    pub fn from_client(client: redis::Client) -> Self {
        Self {
            client,
            blocking: Mutex::new(None),
            manager: OnceCell::new(),
        }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> Result<T, RedisError>,
    ) -> Result<T, CacheError> {
        let mut guard = self.blocking.lock();
        if guard.is_none() {
            debug!("Opening blocking Redis connection");
            *guard = Some(self.client.get_connection()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(CacheError::backend("Redis connection unavailable"));
        };
        match op(conn) {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    warn!("Blocking Redis connection failed ({}); will reconnect", e);
                    *guard = None;
                }
                Err(e.into())
            }
        }
    }

    async fn manager(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }
}

/// Map a PTTL reply: -2 (missing) and -1 (no expiry) carry no TTL.
fn ttl_from_pttl(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

/// PSETEX rejects a zero expiry, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl RemotePersistence for RedisPersistence {
    fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        self.with_connection(|conn| conn.exists(key))
    }

    fn get_cached_value(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.with_connection(|conn| conn.get(key))
    }

    fn key_time_to_live(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let millis: i64 = self.with_connection(|conn| conn.pttl(key))?;
        Ok(ttl_from_pttl(millis))
    }

    fn set_cached_value(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.with_connection(|conn| conn.pset_ex(key, payload, ttl_millis(ttl)))
    }

    fn delete_item(&self, key: &str) -> Result<(), CacheError> {
        self.with_connection(|conn| conn.del(key))
    }

    async fn contains_key_async(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager().await?;
        Ok(conn.exists(key).await?)
    }

    async fn get_cached_value_async(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.manager().await?;
        Ok(conn.get(key).await?)
    }

    async fn key_time_to_live_async(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.manager().await?;
        let millis: i64 = conn.pttl(key).await?;
        Ok(ttl_from_pttl(millis))
    }

    async fn set_cached_value_async(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.manager().await?;
        conn.pset_ex::<_, _, ()>(key, payload, ttl_millis(ttl))
            .await?;
        Ok(())
    }

    async fn delete_item_async(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
