//! Cache error types

use redis::RedisError;

/// Boxed error used for factory and backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cache-related errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache key was empty. Raised before any I/O.
    #[error("cache key must be a non-empty string")]
    InvalidKey,

    #[error("no cached value for key {0}")]
    NotFound(String),

    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),

    #[error("Serialization error: {0}")]
    Serialization(#[source] BoxError),

    /// The value factory passed to `get_or_add` failed.
    #[error("Factory error: {0}")]
    Factory(#[source] BoxError),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(Box::new(e))
    }
}

impl CacheError {
    /// Shorthand for a backend failure described by a message.
    pub fn backend(message: impl Into<String>) -> Self {
        let message: String = message.into();
        CacheError::Backend(message.into())
    }
}

/// Fails with [`CacheError::InvalidKey`] when `key` is empty.
pub(crate) fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(matches!(validate_key(""), Err(CacheError::InvalidKey)));
        assert!(validate_key("k1").is_ok());
        assert!(validate_key(" ").is_ok());
    }

    #[test]
    fn test_backend_message() {
        let err = CacheError::backend("connection refused");
        assert_eq!(err.to_string(), "Backend error: connection refused");
    }
}
