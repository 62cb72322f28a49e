//! Keys, entries and load options shared by the cache layers

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::backend::ResponseFormat;

/// Identifies a file within a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub id: String,
    pub name: String,
}

impl FileKey {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.name)
    }
}

/// A file queued for removal from the backend on the next sync
pub type DeletionCandidate = FileKey;

/// An in-memory file
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub payload: Bytes,
    /// Needs write-back on the next sync
    pub modified: bool,
}

/// A visible load reported to the observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLoad {
    pub id: String,
    pub file_name: String,
}

impl From<&FileKey> for PendingLoad {
    fn from(key: &FileKey) -> Self {
        Self {
            id: key.id.clone(),
            file_name: key.name.clone(),
        }
    }
}

/// Receives the full list of visible pending loads whenever it changes
pub type LoadObserver = Arc<dyn Fn(&[PendingLoad]) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Hide this load from the observer
    pub silent: bool,
    pub format: ResponseFormat,
    /// Backend modification time (ms since epoch); older local copies are discarded
    pub remote_timestamp: Option<u64>,
}

impl LoadOptions {
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn remote_timestamp(mut self, timestamp: u64) -> Self {
        self.remote_timestamp = Some(timestamp);
        self
    }
}

/// A loaded payload in the representation the caller asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileData {
    Blob(Bytes),
    Buffer(Vec<u8>),
}

impl FileData {
    pub fn new(payload: Bytes, format: ResponseFormat) -> Self {
        match format {
            ResponseFormat::Blob => FileData::Blob(payload),
            ResponseFormat::ArrayBuffer => FileData::Buffer(payload.to_vec()),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            FileData::Blob(bytes) => bytes,
            FileData::Buffer(buffer) => buffer,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            FileData::Blob(bytes) => bytes,
            FileData::Buffer(buffer) => Bytes::from(buffer),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}
