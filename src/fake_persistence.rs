//! In-memory remote tier for tests, with per-operation call counters.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{CacheError, RemotePersistence};

#[derive(Default)]
struct Calls {
    contains_key: AtomicUsize,
    get_cached_value: AtomicUsize,
    key_time_to_live: AtomicUsize,
    set_cached_value: AtomicUsize,
    delete_item: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, (Vec<u8>, Option<Instant>)>>,
    calls: Calls,
    failing: AtomicBool,
}

/// Clones share state, so a test can keep one handle while the provider owns another.
#[derive(Clone, Default)]
pub(crate) struct FakePersistence {
    inner: Arc<Inner>,
}

impl FakePersistence {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let payload = serde_json::to_vec(value).unwrap();
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.inner
            .entries
            .lock()
            .insert(key.to_owned(), (payload, expires_at));
    }

    /// Make every subsequent call fail with a backend error.
    pub(crate) fn fail_all(&self) {
        self.inner.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.live(key).map(|(payload, _)| payload)
    }

    pub(crate) fn stored_ttl(&self, key: &str) -> Option<Duration> {
        self.live(key)
            .and_then(|(_, at)| at)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn contains_calls(&self) -> usize {
        self.inner.calls.contains_key.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.inner.calls.get_cached_value.load(Ordering::SeqCst)
    }

    pub(crate) fn ttl_calls(&self) -> usize {
        self.inner.calls.key_time_to_live.load(Ordering::SeqCst)
    }

    pub(crate) fn set_calls(&self) -> usize {
        self.inner.calls.set_cached_value.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.inner.calls.delete_item.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.contains_calls()
            + self.get_calls()
            + self.ttl_calls()
            + self.set_calls()
            + self.delete_calls()
    }

    fn live(&self, key: &str) -> Option<(Vec<u8>, Option<Instant>)> {
        let mut entries = self.inner.entries.lock();
        let expired = matches!(entries.get(key), Some((_, Some(at))) if *at <= Instant::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }

    fn record(&self, counter: &AtomicUsize) -> Result<(), CacheError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(CacheError::backend("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemotePersistence for FakePersistence {
    fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        self.record(&self.inner.calls.contains_key)?;
        Ok(self.live(key).is_some())
    }

    fn get_cached_value(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.record(&self.inner.calls.get_cached_value)?;
        Ok(self.stored(key))
    }

    fn key_time_to_live(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.record(&self.inner.calls.key_time_to_live)?;
        Ok(self.stored_ttl(key))
    }

    fn set_cached_value(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.record(&self.inner.calls.set_cached_value)?;
        self.inner
            .entries
            .lock()
            .insert(key.to_owned(), (payload.to_vec(), Some(Instant::now() + ttl)));
        Ok(())
    }

    fn delete_item(&self, key: &str) -> Result<(), CacheError> {
        self.record(&self.inner.calls.delete_item)?;
        self.inner.entries.lock().remove(key);
        Ok(())
    }

    async fn contains_key_async(&self, key: &str) -> Result<bool, CacheError> {
        tokio::task::yield_now().await;
        self.contains_key(key)
    }

    async fn get_cached_value_async(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        tokio::task::yield_now().await;
        self.get_cached_value(key)
    }

    async fn key_time_to_live_async(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        tokio::task::yield_now().await;
        self.key_time_to_live(key)
    }

    async fn set_cached_value_async(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        tokio::task::yield_now().await;
        self.set_cached_value(key, payload, ttl)
    }

    async fn delete_item_async(&self, key: &str) -> Result<(), CacheError> {
        tokio::task::yield_now().await;
        self.delete_item(key)
    }
}
