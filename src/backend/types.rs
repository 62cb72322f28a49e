//! Backend request and response types

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Representation a caller wants a loaded payload in.
///
/// Only affects the value handed back to the caller; caching always works on
/// the shared [`Bytes`] form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Shared, reference-counted bytes
    #[default]
    Blob,
    /// An owned buffer the caller may mutate
    #[serde(rename = "arraybuffer")]
    ArrayBuffer,
}

/// A named file sent to the backend on write-back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name within the owning file id
    pub name: String,
    /// File content
    pub data: Bytes,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Content length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
