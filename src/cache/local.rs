//! Local Cache
//!
//! Durable, collection-scoped payload store with time-based staleness.
//! A performance layer only: every store failure is logged and treated as a
//! miss or a no-op, never surfaced to the caller.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_DEPRECATION_MS;
use crate::store::{
    ObjectStore, PersistedRecord, StoreConnector, StoreError, TransactionMode, FILES_TABLE,
};

/// Persisted payloads with lazy, destructive staleness eviction
pub struct LocalCache {
    connector: Arc<StoreConnector>,
    store_name: String,
    /// Records older than this are evicted on read
    deprecation: Duration,
    clock: Arc<dyn Clock>,
}

impl LocalCache {
    /// Create a local cache with the default one-day deprecation window
    pub fn new(connector: Arc<StoreConnector>, store_name: impl Into<String>) -> Self {
        Self::with_config(
            connector,
            store_name,
            Duration::from_millis(DEFAULT_DEPRECATION_MS),
            Arc::new(SystemClock),
        )
    }

    pub fn with_config(
        connector: Arc<StoreConnector>,
        store_name: impl Into<String>,
        deprecation: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Self {
            connector,
            store_name: store_name.into(),
            deprecation,
            clock,
        };

        info!(
            store = %cache.store_name,
            deprecation_ms = u64::try_from(cache.deprecation.as_millis()).unwrap_or(u64::MAX),
            "Local cache initialized"
        );

        cache
    }

    /// Key under which a collection file is persisted
    pub fn record_key(collection_id: &str, file_id: &str, file_name: &str) -> String {
        format!("{}_{}_{}", collection_id, file_id, file_name)
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn deprecation(&self) -> Duration {
        self.deprecation
    }

    /// Write a record, stamped with `timestamp` or the current time.
    /// Overwrites any record at the same key.
    pub async fn put(&self, key: &str, data: Bytes, timestamp: Option<u64>) {
        let record = PersistedRecord {
            id: key.to_string(),
            data,
            timestamp: timestamp.unwrap_or_else(|| self.clock.now_millis()),
        };
        let size = record.data.len();

        let result: Result<(), StoreError> = async {
            self.objects(TransactionMode::ReadWrite)
                .await?
                .put(record)
                .await
        }
        .await;

        match result {
            Ok(()) => debug!(key = key, size = size, "Stored file in local cache"),
            Err(e) => warn!(key = key, error = %e, "Failed to store file in local cache"),
        }
    }

    /// Read a record unless it is stale.
    ///
    /// Stale records (too old, or older than `remote_timestamp`) are deleted
    /// before returning `None`.
    pub async fn get(&self, key: &str, remote_timestamp: Option<u64>) -> Option<PersistedRecord> {
        let objects = match self.objects(TransactionMode::ReadWrite).await {
            Ok(objects) => objects,
            Err(e) => {
                debug!(key = key, error = %e, "Local cache unavailable, treating as miss");
                return None;
            }
        };

        let record = match objects.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(key = key, "Local cache MISS");
                return None;
            }
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read local cache");
                return None;
            }
        };

        if self.is_stale(&record, remote_timestamp) {
            debug!(
                key = key,
                timestamp = record.timestamp,
                remote_timestamp = ?remote_timestamp,
                "Local cache record deprecated, evicting"
            );
            if let Err(e) = objects.delete(key).await {
                warn!(key = key, error = %e, "Failed to evict deprecated record");
            }
            return None;
        }

        debug!(key = key, "Local cache HIT");
        Some(record)
    }

    /// Remove a record. Absent keys are not an error.
    pub async fn delete(&self, key: &str) {
        let result: Result<(), StoreError> = async {
            self.objects(TransactionMode::ReadWrite)
                .await?
                .delete(key)
                .await
        }
        .await;

        match result {
            Ok(()) => debug!(key = key, "Invalidated local cache record"),
            Err(e) => warn!(key = key, error = %e, "Failed to delete local cache record"),
        }
    }

    /// Empty the whole table. Best effort.
    pub async fn clear(&self) {
        let result: Result<(), StoreError> =
            async { self.objects(TransactionMode::ReadWrite).await?.clear().await }.await;

        match result {
            Ok(()) => info!(store = %self.store_name, "Cleared local cache"),
            Err(e) => warn!(store = %self.store_name, error = %e, "Failed to clear local cache"),
        }
    }

    /// Whether a record has outlived the deprecation window or is older
    /// than a known remote version. Either condition suffices.
    pub fn is_stale(&self, record: &PersistedRecord, remote_timestamp: Option<u64>) -> bool {
        let age = self.clock.now_millis().saturating_sub(record.timestamp);
        let expired = u128::from(age) >= self.deprecation.as_millis();
        let superseded = remote_timestamp.is_some_and(|remote| record.timestamp < remote);

        expired || superseded
    }

    async fn objects(&self, mode: TransactionMode) -> Result<Box<dyn ObjectStore>, StoreError> {
        let handle = self.connector.open(&self.store_name).await?;
        handle.transaction(FILES_TABLE, mode)
    }
}
