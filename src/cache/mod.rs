//! Caching layers
//!
//! [`FileCache`] keeps a collection's files in memory and coordinates the
//! [`LoadDeduplicator`] and the persistent [`LocalCache`] in front of the
//! remote backend.

pub mod errors;
pub mod file_cache;
pub mod loads;
pub mod local;
pub mod types;

pub use errors::{LoadError, SyncError, SyncFailure, SyncOp};
pub use file_cache::{FileCache, SyncReport};
pub use loads::{LoadDeduplicator, SharedLoad};
pub use local::LocalCache;
pub use types::{
    DeletionCandidate, FileData, FileEntry, FileKey, LoadObserver, LoadOptions, PendingLoad,
};
