//! hybrid-cache - Two-tier cache-aside library
//!
//! This library memoizes expensive computations under string keys across two tiers:
//! - Local: in-process moka cache holding deserialized values (fastest)
//! - Remote: shared, TTL-bound store such as Redis (authoritative across processes)
//!
//! The cache supports:
//! - Blocking and async forms of every operation with identical semantics
//! - Local entries that never outlive the remote TTL they were pulled with
//! - A fixed error policy: fallback operations log and degrade, direct reads propagate
//! - Pluggable remote tier, serializer, and logger
//! - Optional single-flight coalescing of concurrent async computations

mod config;
mod error;
mod local_cache;
mod logger;
mod persistence;
mod provider;
mod redis_persistence;
mod serializer;
mod single_flight;

#[cfg(test)]
mod fake_persistence;

pub use config::{CacheConfig, FALLBACK_TTL};
pub use error::{BoxError, CacheError};
pub use local_cache::LocalCache;
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use persistence::RemotePersistence;
pub use provider::{CacheProvider, CacheProviderBuilder, Cacheable};
pub use redis_persistence::RedisPersistence;
pub use serializer::{JsonSerializer, Serializer};

// Re-export async_trait for implementors of RemotePersistence
pub use async_trait::async_trait;
