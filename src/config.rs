//! File cache configuration
//!
//! Loaded from JSON (camelCase keys) or built in code, with environment
//! overrides for the store name and deprecation window.

use std::env;
use std::time::Duration;

use serde::Deserialize;

/// Default staleness window for locally persisted files: one day
pub const DEFAULT_DEPRECATION_MS: u64 = 86_400_000;

/// Default persistent store name
pub const DEFAULT_STORE_NAME: &str = "cloudcache";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// What `sync` does with an item whose backend call failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncFailurePolicy {
    /// Dirty state is cleared before the call and stays cleared
    #[default]
    Discard,
    /// Failed items are marked dirty or queued for deletion again, unless the
    /// caller touched them while the sync was running
    Requeue,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCacheConfig {
    /// Scopes every backend call and local record key
    pub collection_id: String,

    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Maximum age of a locally persisted file, in milliseconds
    #[serde(default = "default_deprecation_ms", alias = "deprecationTime")]
    pub deprecation_time_ms: u64,

    #[serde(default)]
    pub sync_failure_policy: SyncFailurePolicy,
}

fn default_store_name() -> String {
    DEFAULT_STORE_NAME.to_string()
}

fn default_deprecation_ms() -> u64 {
    DEFAULT_DEPRECATION_MS
}

impl FileCacheConfig {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            store_name: default_store_name(),
            deprecation_time_ms: DEFAULT_DEPRECATION_MS,
            sync_failure_policy: SyncFailurePolicy::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults for `collection_id`, overridden by `CLOUDCACHE_STORE` and
    /// `CLOUDCACHE_DEPRECATION_MS` when set
    pub fn from_env(collection_id: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(collection_id).with_env_overrides(|var| env::var(var).ok())
    }

    fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(store) = lookup("CLOUDCACHE_STORE") {
            self.store_name = store;
        }

        if let Some(value) = lookup("CLOUDCACHE_DEPRECATION_MS") {
            self.deprecation_time_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        var: "CLOUDCACHE_DEPRECATION_MS",
                        value,
                    })?;
        }

        Ok(self)
    }

    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    pub fn with_deprecation_time(mut self, window: Duration) -> Self {
        // Windows beyond u64 milliseconds saturate
        self.deprecation_time_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_sync_failure_policy(mut self, policy: SyncFailurePolicy) -> Self {
        self.sync_failure_policy = policy;
        self
    }

    pub fn deprecation_time(&self) -> Duration {
        Duration::from_millis(self.deprecation_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_deprecation_window_saturates() {
        let config = FileCacheConfig::new("c1").with_deprecation_time(Duration::MAX);
        assert_eq!(config.deprecation_time_ms, u64::MAX);

        let config = FileCacheConfig::new("c1").with_deprecation_time(Duration::from_secs(90));
        assert_eq!(config.deprecation_time_ms, 90_000);
    }

    #[test]
    fn test_json_defaults() {
        let config = FileCacheConfig::from_json(r#"{ "collectionId": "c1" }"#).unwrap();
        assert_eq!(config, FileCacheConfig::new("c1"));
        assert_eq!(config.deprecation_time(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.store_name, "cloudcache");
        assert_eq!(config.sync_failure_policy, SyncFailurePolicy::Discard);
    }

    #[test]
    fn test_json_overrides() {
        let config = FileCacheConfig::from_json(
            r#"{
                "collectionId": "c1",
                "storeName": "drawings",
                "deprecationTime": 1000,
                "syncFailurePolicy": "requeue"
            }"#,
        )
        .unwrap();
        assert_eq!(config.store_name, "drawings");
        assert_eq!(config.deprecation_time_ms, 1000);
        assert_eq!(config.sync_failure_policy, SyncFailurePolicy::Requeue);
    }

    #[test]
    fn test_json_missing_collection() {
        assert!(matches!(
            FileCacheConfig::from_json(r#"{ "storeName": "x" }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = FileCacheConfig::new("c1")
            .with_env_overrides(|var| match var {
                "CLOUDCACHE_STORE" => Some("alt".to_string()),
                "CLOUDCACHE_DEPRECATION_MS" => Some(" 5000 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.store_name, "alt");
        assert_eq!(config.deprecation_time_ms, 5000);

        let err = FileCacheConfig::new("c1")
            .with_env_overrides(|var| {
                (var == "CLOUDCACHE_DEPRECATION_MS").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
