//! Store connection registry
//!
//! Maps store names to a single lazily-resolved open. The first caller for a
//! name starts the open; every caller, then and later, awaits the same
//! outcome. A failed open stays failed for the connector's lifetime.

use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use moka::sync::Cache;
use tracing::{error, info};

use super::{DiskEngine, MemoryEngine, StoreEngine, StoreError, StoreHandle};

type SharedOpen = Shared<BoxFuture<'static, Result<Arc<dyn StoreHandle>, StoreError>>>;

static GLOBAL: OnceLock<Arc<StoreConnector>> = OnceLock::new();

/// Shares one store handle per name across every cache using the connector
pub struct StoreConnector {
    engine: Arc<dyn StoreEngine>,
    /// Pending or resolved opens by store name
    opens: Cache<String, SharedOpen>,
}

impl StoreConnector {
    pub fn new(engine: Arc<dyn StoreEngine>) -> Self {
        let opens = Cache::builder().name("store_connections").build();
        Self { engine, opens }
    }

    /// Connector over a fresh [`MemoryEngine`]
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryEngine::new()))
    }

    /// Process-wide connector over a [`DiskEngine`].
    ///
    /// The root is `CLOUDCACHE_DIR` when set, else the platform cache directory.
    pub fn global() -> Arc<StoreConnector> {
        GLOBAL
            .get_or_init(|| {
                let root = std::env::var_os("CLOUDCACHE_DIR")
                    .map(Into::into)
                    .unwrap_or_else(DiskEngine::default_root);
                Arc::new(Self::new(Arc::new(DiskEngine::new(root))))
            })
            .clone()
    }

    /// Open a store, reusing the shared handle when one exists.
    ///
    /// `StoreError::Unavailable` is returned unchanged to every caller; it is
    /// not retried.
    pub async fn open(&self, name: &str) -> Result<Arc<dyn StoreHandle>, StoreError> {
        let pending = self.opens.get_with(name.to_string(), || {
            let engine = Arc::clone(&self.engine);
            let name = name.to_string();
            async move {
                match engine.open(&name).await {
                    Ok(handle) => {
                        info!(store = %name, "Store connection established");
                        Ok(handle)
                    }
                    Err(e) => {
                        error!(store = %name, error = %e, "Could not open local store");
                        Err(match e {
                            StoreError::Unavailable { .. } => e,
                            other => StoreError::unavailable(&name, other),
                        })
                    }
                }
            }
            .boxed()
            .shared()
        });

        pending.await
    }

    /// Number of store names with a pending or resolved open
    pub fn connection_count(&self) -> u64 {
        self.opens.run_pending_tasks();
        self.opens.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::UnavailableEngine;

    #[tokio::test]
    async fn test_open_happens_once_per_name() {
        let engine = Arc::new(MemoryEngine::new());
        let connector = StoreConnector::new(engine.clone());

        let (a, b) = futures::join!(connector.open("files-db"), connector.open("files-db"));
        let a = a.unwrap();
        let b = b.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        connector.open("files-db").await.unwrap();
        assert_eq!(engine.open_count(), 1);

        connector.open("other-db").await.unwrap();
        assert_eq!(engine.open_count(), 2);
        assert_eq!(connector.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_retried() {
        let engine = Arc::new(UnavailableEngine::default());
        let connector = StoreConnector::new(engine.clone());

        for _ in 0..3 {
            let result = connector.open("broken").await;
            assert!(matches!(result, Err(StoreError::Unavailable { .. })));
        }
        assert_eq!(engine.attempts(), 1);
    }
}
