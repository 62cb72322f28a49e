//! Persistent key-value store
//!
//! An engine opens named stores; a store holds tables of [`PersistedRecord`]s
//! keyed by their `id`. The [`StoreConnector`] shares one open per store name.

pub mod connector;
pub mod disk;
pub mod errors;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub use connector::StoreConnector;
pub use disk::DiskEngine;
pub use errors::StoreError;
pub use memory::MemoryEngine;

/// Table created in every store on first open
pub const FILES_TABLE: &str = "files";

/// A payload persisted in the local store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    /// Unique key within the table
    pub id: String,
    /// Opaque payload
    pub data: Bytes,
    /// Write time in milliseconds since the Unix epoch
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Opens named stores, creating them (and [`FILES_TABLE`]) when missing
#[async_trait]
pub trait StoreEngine: Send + Sync {
    async fn open(&self, name: &str) -> Result<Arc<dyn StoreHandle>, StoreError>;
}

/// An open store
pub trait StoreHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Scope subsequent operations to one table
    fn transaction(
        &self,
        table: &str,
        mode: TransactionMode,
    ) -> Result<Box<dyn ObjectStore>, StoreError>;
}

/// CRUD over one table inside a transaction
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StoreError>;

    /// Insert or overwrite the record stored under `record.id`
    async fn put(&self, record: PersistedRecord) -> Result<(), StoreError>;

    /// Remove a record. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}
