//! Remote tier capability
//!
//! The provider only talks to the remote store through [`RemotePersistence`],
//! so any shared TTL-aware key/value store can back it, and tests can swap in
//! an in-memory fake. Implementations must not retry internally on the
//! provider's behalf; every failure is reported as an `Err`.

use async_trait::async_trait;
use std::time::Duration;

use crate::CacheError;

/// Authoritative, shared, TTL-aware byte store.
///
/// Every operation comes as a blocking/async pair with identical semantics.
#[async_trait]
pub trait RemotePersistence: Send + Sync + 'static {
    fn contains_key(&self, key: &str) -> Result<bool, CacheError>;

    /// Serialized payload for `key`, or `None` if the store has no entry.
    fn get_cached_value(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Remaining time-to-live, or `None` when the key is missing or never expires.
    fn key_time_to_live(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    fn set_cached_value(&self, key: &str, payload: &[u8], ttl: Duration)
    -> Result<(), CacheError>;

    fn delete_item(&self, key: &str) -> Result<(), CacheError>;

    async fn contains_key_async(&self, key: &str) -> Result<bool, CacheError>;

    async fn get_cached_value_async(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn key_time_to_live_async(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn set_cached_value_async(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn delete_item_async(&self, key: &str) -> Result<(), CacheError>;
}
