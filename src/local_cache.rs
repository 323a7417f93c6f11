//! In-process expiring cache (the local tier)
//!
//! Values are stored already deserialized, type-erased behind `Arc<dyn Any>`,
//! each with its own absolute expiration. Expiry is enforced by moka through a
//! per-entry [`Expiry`] policy, and re-checked on read so an entry is never
//! served past its deadline even before moka's housekeeping runs.

use moka::{Expiry, sync::Cache};
use std::{
    any::Any,
    sync::Arc,
    time::{Duration, Instant},
};

type ErasedValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct LocalEntry {
    value: ErasedValue,
    expires_at: Instant,
}

struct AbsoluteExpiry;

impl Expiry<String, LocalEntry> for AbsoluteExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &LocalEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &LocalEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.expires_at.saturating_duration_since(updated_at))
    }
}

/// Thread-safe, expiring key/value container shared by every provider that
/// holds a clone of it.
///
/// Cloning is cheap and yields a handle to the same underlying map. Create one
/// at process start and hand clones to each [`CacheProvider`](crate::CacheProvider).
#[derive(Clone)]
pub struct LocalCache {
    inner: Cache<String, LocalEntry>,
}

impl LocalCache {
    /// Create a local cache holding at most `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(AbsoluteExpiry)
            .build();
        Self { inner }
    }

    /// Get the value stored under `key`.
    ///
    /// Returns `None` when the key is absent, expired, or holds a value of a
    /// different type than `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = self.inner.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Store `value` until the absolute instant `expires_at`.
    ///
    /// A deadline already in the past stores nothing.
    pub fn set<T>(&self, key: &str, value: T, expires_at: Instant)
    where
        T: Send + Sync + 'static,
    {
        if expires_at <= Instant::now() {
            return;
        }
        self.inner.insert(
            key.to_owned(),
            LocalEntry {
                value: Arc::new(value),
                expires_at,
            },
        );
    }

    /// Store `value` for `ttl` from now.
    pub fn set_for<T>(&self, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        match Instant::now().checked_add(ttl) {
            Some(expires_at) => self.set(key, value, expires_at),
            None => self.set(key, value, far_future()),
        }
    }

    /// Whether an unexpired entry exists for `key`, regardless of its type.
    pub fn contains(&self, key: &str) -> bool {
        self.expires_at(key).is_some()
    }

    /// Absolute expiration of the entry under `key`, if it is still live.
    pub fn expires_at(&self, key: &str) -> Option<Instant> {
        self.inner
            .get(key)
            .map(|entry| entry.expires_at)
            .filter(|at| *at > Instant::now())
    }

    pub fn remove(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of entries; pending housekeeping may lag behind.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(crate::CacheConfig::default().local_max_capacity)
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

// Roughly 30 years; keeps Instant arithmetic from overflowing.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}
