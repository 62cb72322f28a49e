//! File cache error types

use std::fmt;
use std::sync::Arc;

use super::types::FileKey;
use crate::backend::BackendError;

/// A load that could not be resolved. Cloned to every caller sharing the load.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to fetch {key}: {source}")]
    RemoteFetchFailed {
        key: FileKey,
        #[source]
        source: Arc<BackendError>,
    },
}

impl LoadError {
    pub fn key(&self) -> &FileKey {
        match self {
            LoadError::RemoteFetchFailed { key, .. } => key,
        }
    }

    pub fn backend_error(&self) -> &BackendError {
        match self {
            LoadError::RemoteFetchFailed { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Update,
    Delete,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOp::Update => f.write_str("update"),
            SyncOp::Delete => f.write_str("delete"),
        }
    }
}

/// One backend call of a sync batch that failed
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub key: FileKey,
    pub op: SyncOp,
    pub error: BackendError,
}

/// Returned once every item of a sync has settled and at least one failed
#[derive(Debug, thiserror::Error)]
#[error("{} of {} sync operations failed", .failures.len(), .attempted)]
pub struct SyncError {
    pub attempted: usize,
    pub failures: Vec<SyncFailure>,
}
