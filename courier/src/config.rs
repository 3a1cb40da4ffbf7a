//! Engine configuration.
//!
//! Every config struct has a `Default` and `with_*` builders; all of them
//! deserialize from JSON so deployments can keep settings in a file. Durations
//! are written as (possibly fractional) seconds.
//!
//! ```
//! use courier::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(
//!     r#"{ "worker": { "concurrency": 8, "poll_interval": 0.5 },
//!          "queue": { "lease_duration": 120 } }"#,
//! ).unwrap();
//! assert_eq!(config.worker.concurrency, 8);
//! ```

use crate::core::CoreError;
use crate::executor::WorkerConfig;
use crate::storage::QueueConfig;
use serde::{Deserialize, Serialize};

/// Settings for one engine process: its worker pool and its task store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
}

impl EngineConfig {
    /// Parses a JSON document. Missing sections and fields take their defaults.
    pub fn from_json_str(json: &str) -> crate::core::Result<Self> {
        serde_json::from_str(json).map_err(CoreError::Deserialization)
    }
}

/// Serde adapter for `Duration` as seconds.
pub mod duration_secs {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Serde adapter for `Option<Duration>` as seconds; `null` means unset.
pub mod option_duration_secs {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_when_empty() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.poll_interval, Duration::from_secs(1));
        assert_eq!(config.worker.provider_timeout, Duration::from_secs(10));
        assert_eq!(config.queue.lease_duration, Duration::from_secs(300));
    }

    #[test]
    fn test_fractional_seconds() {
        let config =
            EngineConfig::from_json_str(r#"{"worker": {"poll_interval": 0.25}}"#).unwrap();
        assert_eq!(config.worker.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result = EngineConfig::from_json_str(r#"{"queue": {"lease_duration": -1}}"#);
        assert!(result.is_err());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_pool_config_optional_durations() {
        let pool: crate::storage::PoolConfig =
            serde_json::from_str(r#"{"max_size": 3, "idle_timeout": null}"#).unwrap();
        assert_eq!(pool.max_size, 3);
        assert_eq!(pool.idle_timeout, None);
        assert_eq!(pool.connection_timeout, Duration::from_secs(30));
    }
}
