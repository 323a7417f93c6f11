//! Value <-> payload conversion for the remote tier

use serde::{Serialize, de::DeserializeOwned};

use crate::CacheError;

/// Converts typed values to opaque byte payloads and back.
///
/// `deserialize::<T>(&serialize(&v)?)` must be value-equal to `v` for every
/// supported `T`. The provider never hands an absent payload to `deserialize`.
pub trait Serializer: Send + Sync + 'static {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CacheError>;
}

/// JSON payloads via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CacheError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    #[test]
    fn test_json_timestamp_payload() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let payload = JsonSerializer.serialize(&ts).unwrap();
        assert_eq!(payload, br#""2024-01-01T00:00:00Z""#);

        let back: DateTime<Utc> = JsonSerializer.deserialize(&payload).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_json_rejects_wrong_shape() {
        let payload = JsonSerializer.serialize(&"not a number").unwrap();
        let err = JsonSerializer.deserialize::<u64>(&payload).unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
