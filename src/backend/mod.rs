//! Remote file backend
//!
//! The authoritative source of files. The cache only consumes this trait;
//! transports live with the application.

pub mod errors;
pub mod types;

use async_trait::async_trait;
use bytes::Bytes;

pub use errors::BackendError;
pub use types::{RemoteFile, ResponseFormat};

/// Operations the file cache needs from the remote backend.
///
/// Implementations must be safe to call concurrently: `sync` issues every
/// update and delete of a batch at once.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Download a file's content
    async fn get_file(
        &self,
        collection_id: &str,
        file_id: &str,
        file_name: &str,
        format: ResponseFormat,
    ) -> Result<Bytes, BackendError>;

    /// Create or replace a file
    async fn update_file(
        &self,
        collection_id: &str,
        file_id: &str,
        file: RemoteFile,
    ) -> Result<(), BackendError>;

    /// Delete a file
    async fn delete_file(
        &self,
        collection_id: &str,
        file_id: &str,
        file_name: &str,
    ) -> Result<(), BackendError>;
}
