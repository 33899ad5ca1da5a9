//! Blob store contract consumed by the media service.

use std::future::Future;

use bytes::Bytes;

use super::error::StorageError;

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct BlobUpload {
    /// Raw file content.
    pub bytes: Bytes,
    /// Filename as sent by the client.
    pub filename: String,
    /// Declared content type.
    pub content_type: String,
}

impl BlobUpload {
    /// Creates an upload from raw parts.
    #[must_use]
    pub fn new(
        bytes: impl Into<Bytes>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A blob that has been durably stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Storage key, recorded as the attachment path.
    pub key: String,
    /// Content type the blob was stored with.
    pub content_type: String,
    /// Stored size in bytes.
    pub size: u64,
}

/// Byte storage for attachment files.
///
/// Implemented by [`super::StorageService`]; tests may substitute their own.
pub trait BlobStore: Send + Sync {
    /// Store `upload` under `folder` and return where it landed.
    fn upload(
        &self,
        folder: &str,
        upload: BlobUpload,
    ) -> impl Future<Output = Result<StoredBlob, StorageError>> + Send;

    /// Delete the blob stored under `key`.
    ///
    /// Returns [`StorageError::NotFound`] if nothing is stored there.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Public URL of `key`, if the store serves blobs publicly.
    fn public_url(&self, _key: &str) -> Option<String> {
        None
    }
}
