//! On-disk store engine
//!
//! Each store is a directory under the engine root, each table a
//! subdirectory, and each record one JSON file named by the SHA-1 of its key.
//! Writes go through a temp file and rename so readers never see a torn record.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::{
    ObjectStore, PersistedRecord, StoreEngine, StoreError, StoreHandle, TransactionMode,
    FILES_TABLE,
};

const RECORD_EXTENSION: &str = "json";

/// Record layout on disk
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    id: String,
    /// Base64-encoded payload
    data: String,
    timestamp: u64,
}

impl From<&PersistedRecord> for DiskRecord {
    fn from(record: &PersistedRecord) -> Self {
        Self {
            id: record.id.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(&record.data),
            timestamp: record.timestamp,
        }
    }
}

impl TryFrom<DiskRecord> for PersistedRecord {
    type Error = StoreError;

    fn try_from(record: DiskRecord) -> Result<Self, Self::Error> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(record.data.as_bytes())
            .map_err(|e| StoreError::failed("get", e))?;

        Ok(PersistedRecord {
            id: record.id,
            data: Bytes::from(data),
            timestamp: record.timestamp,
        })
    }
}

/// Store engine persisting records as files under a root directory
#[derive(Debug, Clone)]
pub struct DiskEngine {
    root: PathBuf,
}

impl DiskEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<platform cache dir>/cloudcache`, falling back to `/tmp/cloudcache`
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("cloudcache")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        // Store names become directory names
        let safe_name = name.replace(['/', '\\', ':'], "_");
        self.root.join(safe_name)
    }
}

impl Default for DiskEngine {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

#[async_trait]
impl StoreEngine for DiskEngine {
    async fn open(&self, name: &str) -> Result<Arc<dyn StoreHandle>, StoreError> {
        let dir = self.store_dir(name);
        let table_dir = dir.join(FILES_TABLE);
        let store_name = name.to_string();

        blocking(move || {
            fs::create_dir_all(&table_dir)
                .map_err(|e| StoreError::unavailable(&store_name, e))?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            StoreError::OperationFailed { reason, .. } => StoreError::unavailable(name, reason),
            other => other,
        })?;

        info!(store = name, dir = %dir.display(), "Opened disk store");

        Ok(Arc::new(DiskStore {
            name: name.to_string(),
            dir,
        }))
    }
}

struct DiskStore {
    name: String,
    dir: PathBuf,
}

impl StoreHandle for DiskStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn transaction(
        &self,
        table: &str,
        mode: TransactionMode,
    ) -> Result<Box<dyn ObjectStore>, StoreError> {
        let dir = self.dir.join(table);
        if !dir.is_dir() {
            return Err(StoreError::MissingTable(table.to_string()));
        }

        Ok(Box::new(DiskObjectStore {
            table: table.to_string(),
            dir,
            mode,
        }))
    }
}

struct DiskObjectStore {
    table: String,
    dir: PathBuf,
    mode: TransactionMode,
}

impl DiskObjectStore {
    fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha1::digest(key.as_bytes());
        self.dir
            .join(format!("{:x}", digest))
            .with_extension(RECORD_EXTENSION)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(StoreError::ReadOnly(self.table.clone())),
        }
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StoreError> {
        let path = self.record_path(key);
        let key = key.to_string();

        blocking(move || {
            let raw = match fs::read(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(StoreError::failed("get", e)),
            };

            let record: DiskRecord =
                serde_json::from_slice(&raw).map_err(|e| StoreError::failed("get", e))?;

            // A digest collision is a miss, not someone else's payload
            if record.id != key {
                debug!(key = %key, stored = %record.id, "Record key mismatch");
                return Ok(None);
            }

            PersistedRecord::try_from(record).map(Some)
        })
        .await
    }

    async fn put(&self, record: PersistedRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        let path = self.record_path(&record.id);
        let dir = self.dir.clone();

        blocking(move || {
            let encoded = serde_json::to_vec(&DiskRecord::from(&record))
                .map_err(|e| StoreError::failed("put", e))?;

            let mut tmp =
                tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::failed("put", e))?;
            tmp.write_all(&encoded)
                .map_err(|e| StoreError::failed("put", e))?;
            tmp.persist(&path)
                .map_err(|e| StoreError::failed("put", e))?;

            debug!(key = %record.id, size = record.data.len(), "Stored record on disk");
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let path = self.record_path(key);

        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::failed("delete", e)),
        })
        .await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        let dir = self.dir.clone();

        blocking(move || {
            let read_dir = fs::read_dir(&dir).map_err(|e| StoreError::failed("clear", e))?;
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| StoreError::failed("clear", e))?;
                }
            }
            Ok(())
        })
        .await
    }
}

/// Run filesystem work off the async executor
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::failed("io", e))?
}
