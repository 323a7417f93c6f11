//! Cache configuration

use serde::Deserialize;
use std::time::Duration;

/// Remote TTL used when neither the caller nor the configuration supplies one.
pub const FALLBACK_TTL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the two-tier cache
///
/// Deserializable from any serde format; durations are whole seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis connection string, e.g. `redis://127.0.0.1:6379/0`
    pub connection_string: String,
    /// Default time-to-live for remote entries (one hour when unset)
    #[serde(rename = "default_ttl_secs", with = "opt_secs")]
    pub default_ttl: Option<Duration>,
    /// Maximum number of entries held by the local tier
    pub local_max_capacity: u64,
    /// Coalesce concurrent async computations of the same key
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            connection_string: "redis://127.0.0.1:6379".to_owned(),
            default_ttl: None,
            local_max_capacity: 10_000,
            single_flight: false,
        }
    }
}

impl CacheConfig {
    /// Config pointing at the given Redis connection string, everything else default.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    /// The configured default TTL, or one hour.
    pub fn effective_default_ttl(&self) -> Duration {
        self.default_ttl.unwrap_or(FALLBACK_TTL)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttl_falls_back_to_one_hour() {
        let config = CacheConfig::default();
        assert_eq!(config.effective_default_ttl(), Duration::from_secs(3600));

        let config = CacheConfig {
            default_ttl: Some(Duration::from_secs(30)),
            ..CacheConfig::new("redis://cache:6379")
        };
        assert_eq!(config.effective_default_ttl(), Duration::from_secs(30));
        assert_eq!(config.connection_string, "redis://cache:6379");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"connection_string": "redis://cache:6379", "default_ttl_secs": 120}"#,
        )
        .unwrap();
        assert_eq!(config.connection_string, "redis://cache:6379");
        assert_eq!(config.default_ttl, Some(Duration::from_secs(120)));
        assert_eq!(config.local_max_capacity, 10_000);
        assert!(!config.single_flight);

        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_ttl, None);
    }
}
