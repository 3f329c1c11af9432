//! Serde helpers for settings fields

/// Timeouts stored as whole seconds
///
/// `timeout = 30` reads better in TOML than a `{ secs, nanos }` table. Zero
/// is rejected: every remote and agent call is bounded by these values and a
/// zero bound would fail them all immediately.
///
/// ```ignore
/// #[serde(with = "pl_core::config::serde_utils::duration_secs")]
/// request_timeout: Duration,
/// ```
pub mod duration_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u64::deserialize(deserializer)? {
            0 => Err(D::Error::custom("timeout must be at least 1 second")),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        request_timeout: Duration,
    }

    #[test]
    fn test_writes_whole_seconds() {
        let timeouts = Timeouts {
            request_timeout: Duration::from_millis(30_400),
        };
        let toml = toml::to_string(&timeouts).unwrap();
        assert_eq!(toml.trim(), "request_timeout = 30");
    }

    #[test]
    fn test_reads_seconds() {
        let timeouts: Timeouts = toml::from_str("request_timeout = 10").unwrap();
        assert_eq!(timeouts.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_zero() {
        let err = toml::from_str::<Timeouts>("request_timeout = 0").unwrap_err();
        assert!(err.to_string().contains("at least 1 second"));
    }
}
