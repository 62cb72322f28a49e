//! Test doubles shared by unit tests

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{Backend, BackendError, RemoteFile, ResponseFormat};
use crate::store::{
    ObjectStore, PersistedRecord, StoreEngine, StoreError, StoreHandle, TransactionMode,
};

/// Engine whose every open fails
#[derive(Default)]
pub(crate) struct UnavailableEngine {
    attempts: AtomicUsize,
}

impl UnavailableEngine {
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreEngine for UnavailableEngine {
    async fn open(&self, name: &str) -> Result<Arc<dyn StoreHandle>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::unavailable(name, "quota exceeded"))
    }
}

/// Overwrite every record file in a disk table with invalid JSON
pub(crate) fn corrupt_records(table_dir: &Path) {
    for entry in std::fs::read_dir(table_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "json") {
            std::fs::write(&path, b"{garbage").unwrap();
        }
    }
}

/// Engine that opens fine but fails every record operation
#[derive(Default)]
pub(crate) struct FailingOpsEngine {
    operations: Arc<AtomicUsize>,
}

impl FailingOpsEngine {
    /// Record operations attempted so far
    pub(crate) fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreEngine for FailingOpsEngine {
    async fn open(&self, name: &str) -> Result<Arc<dyn StoreHandle>, StoreError> {
        Ok(Arc::new(FailingStore {
            name: name.to_string(),
            operations: self.operations.clone(),
        }))
    }
}

struct FailingStore {
    name: String,
    operations: Arc<AtomicUsize>,
}

impl StoreHandle for FailingStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn transaction(
        &self,
        _table: &str,
        _mode: TransactionMode,
    ) -> Result<Box<dyn ObjectStore>, StoreError> {
        Ok(Box::new(FailingObjects {
            operations: self.operations.clone(),
        }))
    }
}

struct FailingObjects {
    operations: Arc<AtomicUsize>,
}

impl FailingObjects {
    fn fail(&self, op: &'static str) -> StoreError {
        self.operations.fetch_add(1, Ordering::SeqCst);
        StoreError::failed(op, "disk I/O error")
    }
}

#[async_trait]
impl ObjectStore for FailingObjects {
    async fn get(&self, _key: &str) -> Result<Option<PersistedRecord>, StoreError> {
        Err(self.fail("get"))
    }

    async fn put(&self, _record: PersistedRecord) -> Result<(), StoreError> {
        Err(self.fail("put"))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(self.fail("delete"))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Err(self.fail("clear"))
    }
}

/// In-memory backend recording every call
#[derive(Default)]
pub(crate) struct MockBackend {
    files: Mutex<HashMap<(String, String), Bytes>>,
    failing: Mutex<HashSet<String>>,
    get_calls: AtomicUsize,
    updates: Mutex<Vec<(String, String, RemoteFile)>>,
    deletes: Mutex<Vec<(String, String, String)>>,
}

impl MockBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn insert(&self, file_id: &str, file_name: &str, data: &'static [u8]) {
        self.files.lock().unwrap().insert(
            (file_id.to_string(), file_name.to_string()),
            Bytes::from_static(data),
        );
    }

    /// Make every call touching `file_id` fail with a transient error
    pub(crate) fn fail(&self, file_id: &str) {
        self.failing.lock().unwrap().insert(file_id.to_string());
    }

    pub(crate) fn heal(&self, file_id: &str) {
        self.failing.lock().unwrap().remove(file_id);
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// `(collection_id, file_id, file)` per update call
    pub(crate) fn updates(&self) -> Vec<(String, String, RemoteFile)> {
        self.updates.lock().unwrap().clone()
    }

    /// `(collection_id, file_id, file_name)` per delete call
    pub(crate) fn deletes(&self) -> Vec<(String, String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    fn check(&self, file_id: &str) -> Result<(), BackendError> {
        if self.failing.lock().unwrap().contains(file_id) {
            return Err(BackendError::Unavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn get_file(
        &self,
        _collection_id: &str,
        file_id: &str,
        file_name: &str,
        _format: ResponseFormat,
    ) -> Result<Bytes, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.check(file_id)?;

        self.files
            .lock()
            .unwrap()
            .get(&(file_id.to_string(), file_name.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", file_id, file_name)))
    }

    async fn update_file(
        &self,
        collection_id: &str,
        file_id: &str,
        file: RemoteFile,
    ) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        self.updates.lock().unwrap().push((
            collection_id.to_string(),
            file_id.to_string(),
            file.clone(),
        ));
        self.check(file_id)?;

        self.files
            .lock()
            .unwrap()
            .insert((file_id.to_string(), file.name), file.data);
        Ok(())
    }

    async fn delete_file(
        &self,
        collection_id: &str,
        file_id: &str,
        file_name: &str,
    ) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        self.deletes.lock().unwrap().push((
            collection_id.to_string(),
            file_id.to_string(),
            file_name.to_string(),
        ));
        self.check(file_id)?;

        self.files
            .lock()
            .unwrap()
            .remove(&(file_id.to_string(), file_name.to_string()));
        Ok(())
    }
}
