//! In-process store engine
//!
//! Keeps every store in memory for the lifetime of the engine. Reopening a
//! store name returns the same data, so it behaves like a persistent engine
//! within one process.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::{
    ObjectStore, PersistedRecord, StoreEngine, StoreError, StoreHandle, TransactionMode,
    FILES_TABLE,
};

type Table = BTreeMap<String, PersistedRecord>;

/// Store engine backed by process memory
#[derive(Default)]
pub struct MemoryEngine {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
    opens: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `open` has been called on this engine
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StoreEngine for MemoryEngine {
    async fn open(&self, name: &str) -> Result<Arc<dyn StoreHandle>, StoreError> {
        self.opens.fetch_add(1, Ordering::Relaxed);

        let mut stores = self
            .stores
            .lock()
            .map_err(|e| StoreError::unavailable(name, e))?;

        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(store = name, "Creating in-memory store");
                Arc::new(MemoryStore::new(name))
            })
            .clone();

        store.ensure_table(FILES_TABLE)?;
        Ok(store)
    }
}

/// One named in-memory store
struct MemoryStore {
    name: String,
    tables: Arc<Mutex<HashMap<String, Table>>>,
}

impl MemoryStore {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|e| StoreError::unavailable(&self.name, e))?;
        tables.entry(table.to_string()).or_default();
        Ok(())
    }
}

impl StoreHandle for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn transaction(
        &self,
        table: &str,
        mode: TransactionMode,
    ) -> Result<Box<dyn ObjectStore>, StoreError> {
        let tables = self
            .tables
            .lock()
            .map_err(|e| StoreError::failed("transaction", e))?;
        if !tables.contains_key(table) {
            return Err(StoreError::MissingTable(table.to_string()));
        }

        Ok(Box::new(MemoryObjectStore {
            tables: Arc::clone(&self.tables),
            table: table.to_string(),
            mode,
        }))
    }
}

struct MemoryObjectStore {
    tables: Arc<Mutex<HashMap<String, Table>>>,
    table: String,
    mode: TransactionMode,
}

impl MemoryObjectStore {
    fn with_table<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Table) -> T,
    ) -> Result<T, StoreError> {
        if op != "get" && self.mode == TransactionMode::ReadOnly {
            return Err(StoreError::ReadOnly(self.table.clone()));
        }

        let mut tables = self.tables.lock().map_err(|e| StoreError::failed(op, e))?;
        let table = tables
            .get_mut(&self.table)
            .ok_or_else(|| StoreError::MissingTable(self.table.clone()))?;
        Ok(f(table))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StoreError> {
        self.with_table("get", |table| table.get(key).cloned())
    }

    async fn put(&self, record: PersistedRecord) -> Result<(), StoreError> {
        self.with_table("put", |table| {
            table.insert(record.id.clone(), record);
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_table("delete", |table| {
            table.remove(key);
        })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.with_table("clear", |table| table.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn record(id: &str, data: &'static [u8], timestamp: u64) -> PersistedRecord {
        PersistedRecord {
            id: id.to_string(),
            data: Bytes::from_static(data),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let engine = MemoryEngine::new();
        let handle = engine.open("test").await.unwrap();
        let files = handle
            .transaction(FILES_TABLE, TransactionMode::ReadWrite)
            .unwrap();

        assert!(files.get("a").await.unwrap().is_none());

        files.put(record("a", b"one", 1)).await.unwrap();
        files.put(record("a", b"two", 2)).await.unwrap();
        assert_eq!(files.get("a").await.unwrap(), Some(record("a", b"two", 2)));

        files.delete("a").await.unwrap();
        files.delete("a").await.unwrap();
        assert!(files.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_shares_data() {
        let engine = MemoryEngine::new();
        let first = engine.open("shared").await.unwrap();
        first
            .transaction(FILES_TABLE, TransactionMode::ReadWrite)
            .unwrap()
            .put(record("k", b"v", 5))
            .await
            .unwrap();

        let second = engine.open("shared").await.unwrap();
        let found = second
            .transaction(FILES_TABLE, TransactionMode::ReadOnly)
            .unwrap()
            .get("k")
            .await
            .unwrap();
        assert_eq!(found, Some(record("k", b"v", 5)));
        assert_eq!(engine.open_count(), 2);

        let other = engine.open("other").await.unwrap();
        let missing = other
            .transaction(FILES_TABLE, TransactionMode::ReadOnly)
            .unwrap()
            .get("k")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_read_only_and_missing_table() {
        let engine = MemoryEngine::new();
        let handle = engine.open("test").await.unwrap();

        let readonly = handle
            .transaction(FILES_TABLE, TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(
            readonly.put(record("a", b"x", 0)).await,
            Err(StoreError::ReadOnly(FILES_TABLE.to_string()))
        );

        assert!(matches!(
            handle.transaction("thumbnails", TransactionMode::ReadOnly),
            Err(StoreError::MissingTable(_))
        ));
    }

    #[tokio::test]
    async fn test_clear() {
        let engine = MemoryEngine::new();
        let handle = engine.open("test").await.unwrap();
        let files = handle
            .transaction(FILES_TABLE, TransactionMode::ReadWrite)
            .unwrap();

        files.put(record("a", b"1", 0)).await.unwrap();
        files.put(record("b", b"2", 0)).await.unwrap();
        files.clear().await.unwrap();

        assert!(files.get("a").await.unwrap().is_none());
        assert!(files.get("b").await.unwrap().is_none());
    }
}
