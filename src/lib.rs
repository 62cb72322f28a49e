//! cloudcache - client-side file cache for remote collections
//!
//! Files are served from memory, from an in-flight load of the same file,
//! from a persistent local store with time-based staleness, or from the
//! remote [`Backend`], in that order. Local edits and deletions are held in
//! memory until [`FileCache::sync`] writes them back.

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, BackendError, RemoteFile, ResponseFormat};
pub use cache::{
    FileCache, FileData, FileKey, LoadError, LoadObserver, LoadOptions, LocalCache, PendingLoad,
    SyncError, SyncReport,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, FileCacheConfig, SyncFailurePolicy};
pub use store::{DiskEngine, MemoryEngine, StoreConnector, StoreEngine, StoreError};
