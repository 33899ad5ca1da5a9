//! Blob storage errors.

use thiserror::Error;

/// Errors raised while storing or deleting attachment blobs.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Upload is larger than the configured limit.
    #[error("upload of {size} bytes exceeds the {max} byte limit")]
    FileTooLarge {
        /// Upload size in bytes.
        size: u64,
        /// Configured limit in bytes.
        max: u64,
    },

    /// Upload has no content.
    #[error("upload is empty")]
    EmptyFile,

    /// Content type is not on the allow-list.
    #[error("content type '{content_type}' is not accepted")]
    InvalidMimeType {
        /// Rejected content type.
        content_type: String,
    },

    /// Nothing is stored under the key.
    #[error("no blob stored under '{key}'")]
    NotFound {
        /// Requested key.
        key: String,
    },

    /// Provider settings are incomplete or invalid.
    #[error("storage is misconfigured: {0}")]
    Configuration(String),

    /// The backend rejected or failed the request.
    #[error("blob store request failed: {message}")]
    Operation {
        /// Backend message.
        message: String,
        /// Whether the backend reported the failure as transient.
        temporary: bool,
    },
}

impl StorageError {
    /// Upload exceeded `max` bytes.
    #[must_use]
    pub fn file_too_large(size: u64, max: u64) -> Self {
        Self::FileTooLarge { size, max }
    }

    /// Content type refused by the allow-list.
    #[must_use]
    pub fn invalid_mime_type(content_type: impl Into<String>) -> Self {
        Self::InvalidMimeType {
            content_type: content_type.into(),
        }
    }

    /// No blob under `key`.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Invalid provider settings.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Permanent backend failure.
    #[must_use]
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation {
            message: msg.into(),
            temporary: false,
        }
    }

    /// Whether the error was caused by the uploaded content itself.
    #[must_use]
    pub const fn is_rejected_upload(&self) -> bool {
        matches!(
            self,
            Self::FileTooLarge { .. } | Self::EmptyFile | Self::InvalidMimeType { .. }
        )
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                key: err.to_string(),
            },
            opendal::ErrorKind::ConfigInvalid => Self::Configuration(err.to_string()),
            _ => Self::Operation {
                temporary: err.is_temporary(),
                message: err.to_string(),
            },
        }
    }
}
