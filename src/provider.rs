//! Two-tier cache-aside provider
//!
//! [`CacheProvider`] layers a [`LocalCache`] in front of a [`RemotePersistence`]:
//! - Local tier: in-process, already-deserialized values, expiring no later
//!   than the remote TTL observed when they were pulled
//! - Remote tier: shared and authoritative, holds serialized payloads with a TTL
//!
//! Every operation validates its key first and exists in a blocking and an
//! async form with the same branching. Failures follow a fixed policy:
//! operations with a fallback (`get_or_add`, `contains_key`, `delete_item`)
//! log through the configured [`Logger`] and degrade; `get_cached_value` and
//! `add_or_update_value` propagate; `try_get` reports any failure as a miss.
//!
//! The local tier is not touched by `add_or_update_value` or `delete_item`, so a
//! local entry can outlive a remote overwrite or delete until it expires. Use
//! [`CacheProvider::evict_local`] where read-after-write matters.

use serde::{Serialize, de::DeserializeOwned};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::debug;

use crate::{
    BoxError, CacheConfig, CacheError, JsonSerializer, LocalCache, Logger, NoopLogger,
    RedisPersistence, RemotePersistence, Serializer,
    config::FALLBACK_TTL,
    error::validate_key,
    single_flight::{ErasedValue, Flight, SingleFlight},
};

/// Trait for types that can be cached
pub trait Cacheable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Cache-aside orchestrator over a local and a remote tier.
///
/// Cloning is cheap; clones share the remote handle, local cache, and logger.
pub struct CacheProvider<S: Serializer = JsonSerializer> {
    remote: Arc<dyn RemotePersistence>,
    local: LocalCache,
    serializer: Arc<S>,
    logger: Arc<dyn Logger>,
    default_ttl: Duration,
    single_flight: Option<SingleFlight>,
}

impl<S: Serializer> Clone for CacheProvider<S> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            local: self.local.clone(),
            serializer: Arc::clone(&self.serializer),
            logger: Arc::clone(&self.logger),
            default_ttl: self.default_ttl,
            single_flight: self.single_flight.clone(),
        }
    }
}

impl CacheProvider {
    /// Start building a provider over the given remote tier.
    pub fn builder(remote: impl RemotePersistence) -> CacheProviderBuilder {
        CacheProviderBuilder::new(remote)
    }

    /// Provider backed by Redis at `config.connection_string`, with a fresh local
    /// cache. The connection is opened lazily on first use.
    pub fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let remote = RedisPersistence::open(&config.connection_string)?;
        Ok(Self::builder(remote).config(config).build())
    }
}

impl<S: Serializer> CacheProvider<S> {
    /// The local tier this provider reads through.
    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    /// TTL applied when a caller does not pass one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // ---------------------------------------------------------------------
    // Blocking operations
    // ---------------------------------------------------------------------

    /// Return the cached value for `key`, computing and storing it on a full miss.
    ///
    /// Local hit: returned without touching the remote tier. Remote hit: pulled,
    /// cached locally for the remote's remaining TTL, returned. Full miss:
    /// `factory` runs once, its result is written to the remote tier with `ttl`
    /// (or the default) and to the local tier.
    ///
    /// Any remote, serialization, or factory failure is logged and yields
    /// `T::default()`. Only an empty key is an error.
    pub fn get_or_add<T, E, F>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Cacheable + Default,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        validate_key(key)?;

        if let Some(value) = self.local.get::<T>(key) {
            debug!("Cache hit L1 for key: {}", key);
            return Ok(value);
        }
        debug!("Cache miss L1 for key: {}", key);

        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.fetch_or_compute(key, ttl, factory) {
            Ok(value) => Ok(value),
            Err(e) => Ok(self.add_failed(key, &e)),
        }
    }

    /// Read a value that must already be cached.
    ///
    /// Fails with [`CacheError::NotFound`] when the remote tier has no entry;
    /// remote and deserialization failures propagate unchanged.
    pub fn get_cached_value<T: Cacheable>(&self, key: &str) -> Result<T, CacheError> {
        validate_key(key)?;

        if let Some(value) = self.local.get::<T>(key) {
            debug!("Cache hit L1 for key: {}", key);
            return Ok(value);
        }
        self.pull_remote(key)
    }

    /// Like [`get_cached_value`](Self::get_cached_value), but any miss or
    /// failure comes back as `Ok(None)`.
    pub fn try_get<T: Cacheable>(&self, key: &str) -> Result<Option<T>, CacheError> {
        validate_key(key)?;

        if let Some(value) = self.local.get::<T>(key) {
            debug!("Cache hit L1 for key: {}", key);
            return Ok(Some(value));
        }
        Ok(self.read_or_miss(key, self.pull_remote(key)))
    }

    /// Whether either tier holds `key`. A remote failure is logged and reads as `false`.
    pub fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;

        if self.local.contains(key) {
            return Ok(true);
        }
        match self.remote.contains_key(key) {
            Ok(found) => Ok(found),
            Err(e) => Ok(self.contains_failed(key, &e)),
        }
    }

    /// Serialize `value` and write it to the remote tier with `ttl` (or the default).
    ///
    /// The local tier is left as is.
    pub fn add_or_update_value<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;

        let payload = self.serializer.serialize(value)?;
        self.remote
            .set_cached_value(key, &payload, ttl.unwrap_or(self.default_ttl))
    }

    /// Delete `key` from the remote tier. Failures are logged, never returned.
    ///
    /// The local tier is left as is.
    pub fn delete_item(&self, key: &str) -> Result<(), CacheError> {
        validate_key(key)?;

        if let Err(e) = self.remote.delete_item(key) {
            self.logger
                .error_with(&e, &format!("can't delete key {}", key));
        }
        Ok(())
    }

    /// Drop the local copy of `key`, if any. The remote tier is not touched.
    pub fn evict_local(&self, key: &str) -> Result<(), CacheError> {
        validate_key(key)?;

        debug!("Evicting L1 entry for key: {}", key);
        self.local.remove(key);
        Ok(())
    }

    fn fetch_or_compute<T, E, F>(
        &self,
        key: &str,
        ttl: Duration,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Cacheable,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        if self.remote.contains_key(key)? {
            return self.pull_remote(key);
        }
        debug!("Cache miss L2 for key: {}", key);

        let value = factory().map_err(|e| CacheError::Factory(e.into()))?;
        let payload = self.serializer.serialize(&value)?;
        self.remote.set_cached_value(key, &payload, ttl)?;
        self.populate_local(key, &value, Some(ttl));
        Ok(value)
    }

    fn pull_remote<T: Cacheable>(&self, key: &str) -> Result<T, CacheError> {
        let Some(payload) = self.remote.get_cached_value(key)? else {
            debug!("Cache miss L2 for key: {}", key);
            return Err(CacheError::NotFound(key.to_owned()));
        };
        debug!("Cache hit L2 for key: {}", key);

        let ttl = self.remote.key_time_to_live(key)?;
        let value: T = self.serializer.deserialize(&payload)?;
        self.populate_local(key, &value, ttl);
        Ok(value)
    }

    // ---------------------------------------------------------------------
    // Async operations
    // ---------------------------------------------------------------------

    /// Async [`get_or_add`](Self::get_or_add) with an async factory.
    ///
    /// With single-flight enabled, concurrent full misses on the same key share
    /// one factory run.
    pub async fn get_or_add_async<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Cacheable + Default,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        validate_key(key)?;

        if let Some(value) = self.local.get::<T>(key) {
            debug!("Cache hit L1 for key: {}", key);
            return Ok(value);
        }
        debug!("Cache miss L1 for key: {}", key);

        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.fetch_or_compute_async(key, ttl, factory).await {
            Ok(value) => Ok(value),
            Err(e) => Ok(self.add_failed(key, &e)),
        }
    }

    /// Async [`get_or_add`](Self::get_or_add) with a blocking factory, run inline
    /// on the calling task.
    pub async fn get_or_add_async_from_fn<T, E, F>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Cacheable + Default,
        E: Into<BoxError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.get_or_add_async(key, ttl, move || std::future::ready(factory()))
            .await
    }

    /// Async [`get_cached_value`](Self::get_cached_value).
    pub async fn get_cached_value_async<T: Cacheable>(&self, key: &str) -> Result<T, CacheError> {
        validate_key(key)?;

        if let Some(value) = self.local.get::<T>(key) {
            debug!("Cache hit L1 for key: {}", key);
            return Ok(value);
        }
        self.pull_remote_async(key).await
    }

    /// Async [`try_get`](Self::try_get).
    pub async fn try_get_async<T: Cacheable>(&self, key: &str) -> Result<Option<T>, CacheError> {
        validate_key(key)?;

        if let Some(value) = self.local.get::<T>(key) {
            debug!("Cache hit L1 for key: {}", key);
            return Ok(Some(value));
        }
        let result = self.pull_remote_async(key).await;
        Ok(self.read_or_miss(key, result))
    }

    /// Async [`contains_key`](Self::contains_key).
    pub async fn contains_key_async(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;

        if self.local.contains(key) {
            return Ok(true);
        }
        match self.remote.contains_key_async(key).await {
            Ok(found) => Ok(found),
            Err(e) => Ok(self.contains_failed(key, &e)),
        }
    }

    /// Async [`add_or_update_value`](Self::add_or_update_value).
    pub async fn add_or_update_value_async<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;

        let payload = self.serializer.serialize(value)?;
        self.remote
            .set_cached_value_async(key, &payload, ttl.unwrap_or(self.default_ttl))
            .await
    }

    /// Async [`delete_item`](Self::delete_item).
    pub async fn delete_item_async(&self, key: &str) -> Result<(), CacheError> {
        validate_key(key)?;

        if let Err(e) = self.remote.delete_item_async(key).await {
            self.logger
                .error_with(&e, &format!("can't delete key {}", key));
        }
        Ok(())
    }

    async fn fetch_or_compute_async<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Cacheable,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.remote.contains_key_async(key).await? {
            return self.pull_remote_async(key).await;
        }
        debug!("Cache miss L2 for key: {}", key);

        let guard = match self.single_flight.as_ref().map(|sf| sf.join(key)) {
            Some(Flight::Follower(waiter)) => {
                debug!("Waiting for in-flight computation for key: {}", key);
                return waiter.wait::<T>().await;
            }
            Some(Flight::Leader(guard)) => {
                // A previous leader may have finished between the L2 miss and join
                if let Some(value) = self.local.get::<T>(key) {
                    debug!("Cache hit L1 after joining in-flight for key: {}", key);
                    guard.complete(Ok(Arc::new(value.clone()) as ErasedValue));
                    return Ok(value);
                }
                Some(guard)
            }
            None => None,
        };

        let result = self.compute_and_store_async(key, ttl, factory).await;

        if let Some(guard) = guard {
            guard.complete(match &result {
                Ok(value) => Ok(Arc::new(value.clone()) as ErasedValue),
                Err(e) => Err(e.to_string()),
            });
        }
        result
    }

    async fn compute_and_store_async<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        factory: F,
    ) -> Result<T, CacheError>
    where
        T: Cacheable,
        E: Into<BoxError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = factory().await.map_err(|e| CacheError::Factory(e.into()))?;
        let payload = self.serializer.serialize(&value)?;
        self.remote.set_cached_value_async(key, &payload, ttl).await?;
        self.populate_local(key, &value, Some(ttl));
        Ok(value)
    }

    async fn pull_remote_async<T: Cacheable>(&self, key: &str) -> Result<T, CacheError> {
        let Some(payload) = self.remote.get_cached_value_async(key).await? else {
            debug!("Cache miss L2 for key: {}", key);
            return Err(CacheError::NotFound(key.to_owned()));
        };
        debug!("Cache hit L2 for key: {}", key);

        let ttl = self.remote.key_time_to_live_async(key).await?;
        let value: T = self.serializer.deserialize(&payload)?;
        self.populate_local(key, &value, ttl);
        Ok(value)
    }

    // ---------------------------------------------------------------------
    // Shared policy
    // ---------------------------------------------------------------------

    /// Cache `value` locally for `ttl`. No TTL (or zero) means the remote entry
    /// gives no bound, so nothing is cached.
    fn populate_local<T: Cacheable>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match ttl {
            Some(ttl) if !ttl.is_zero() => self.local.set_for(key, value.clone(), ttl),
            _ => debug!("No remote TTL for key {}; skipping L1 population", key),
        }
    }

    fn add_failed<T: Default>(&self, key: &str, err: &CacheError) -> T {
        self.logger
            .error_with(err, &format!("can't add or update value for {}", key));
        T::default()
    }

    fn contains_failed(&self, key: &str, err: &CacheError) -> bool {
        self.logger
            .error_with(err, &format!("can't check contains of key {}", key));
        false
    }

    fn read_or_miss<T>(&self, key: &str, result: Result<T, CacheError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(CacheError::NotFound(_)) => None,
            Err(e) => {
                self.logger
                    .warn(&format!("can't read value for {}: {}", key, e));
                None
            }
        }
    }
}

/// Builder for [`CacheProvider`]
pub struct CacheProviderBuilder<S: Serializer = JsonSerializer> {
    remote: Arc<dyn RemotePersistence>,
    local: Option<LocalCache>,
    local_max_capacity: u64,
    serializer: S,
    logger: Arc<dyn Logger>,
    default_ttl: Duration,
    single_flight: bool,
}

impl CacheProviderBuilder {
    pub fn new(remote: impl RemotePersistence) -> Self {
        let defaults = CacheConfig::default();
        Self {
            remote: Arc::new(remote),
            local: None,
            local_max_capacity: defaults.local_max_capacity,
            serializer: JsonSerializer,
            logger: Arc::new(NoopLogger),
            default_ttl: FALLBACK_TTL,
            single_flight: defaults.single_flight,
        }
    }
}

impl<S: Serializer> CacheProviderBuilder<S> {
    /// Apply TTL, local capacity, and single-flight settings from `config`.
    pub fn config(mut self, config: &CacheConfig) -> Self {
        self.default_ttl = config.effective_default_ttl();
        self.local_max_capacity = config.local_max_capacity;
        self.single_flight = config.single_flight;
        self
    }

    /// Share an existing local cache instead of creating a new one.
    pub fn local_cache(mut self, local: LocalCache) -> Self {
        self.local = Some(local);
        self
    }

    pub fn logger(mut self, logger: impl Logger) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn serializer<S2: Serializer>(self, serializer: S2) -> CacheProviderBuilder<S2> {
        CacheProviderBuilder {
            remote: self.remote,
            local: self.local,
            local_max_capacity: self.local_max_capacity,
            serializer,
            logger: self.logger,
            default_ttl: self.default_ttl,
            single_flight: self.single_flight,
        }
    }

    pub fn build(self) -> CacheProvider<S> {
        CacheProvider {
            remote: self.remote,
            local: self
                .local
                .unwrap_or_else(|| LocalCache::new(self.local_max_capacity)),
            serializer: Arc::new(self.serializer),
            logger: self.logger,
            default_ttl: self.default_ttl,
            single_flight: self.single_flight.then(SingleFlight::default),
        }
    }
}
