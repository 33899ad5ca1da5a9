//! Media engine error types.

use adopet_shared::{AppError, types::AttachmentId};
use thiserror::Error;

use super::types::{ParentRef, Removal};
use crate::storage::StorageError;

/// Media operation errors.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The referenced parent entity does not exist.
    #[error("parent not found: {0}")]
    InvalidParent(ParentRef),

    /// The referenced attachment does not exist.
    #[error("attachment not found: {0}")]
    NotFound(AttachmentId),

    /// Requested placement is outside `0..=count`.
    #[error("order index {requested} is out of range for {count} attachment(s)")]
    InvalidIndex {
        /// Requested slot.
        requested: u32,
        /// Current number of attachments of the parent.
        count: usize,
    },

    /// The delete would leave the parent without any attachment.
    #[error("cannot remove the last attachment of {parent}")]
    LastAttachmentConflict {
        /// Parent that would be left empty.
        parent: ParentRef,
    },

    /// A parent with the same unique key already exists.
    #[error("parent already exists: {0}")]
    DuplicateParent(String),

    /// Attachment metadata is unusable.
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// The ledger transaction could not be completed.
    #[error("ledger transaction failed: {message}")]
    StoreTransactionFailure {
        /// Backend message.
        message: String,
        /// Whether re-running the operation may succeed.
        retryable: bool,
    },

    /// The ledger delete committed but the blob could not be removed.
    #[error("attachment removed but its blob could not be deleted: {source}")]
    BlobDeletionFailure {
        /// The committed removal.
        removal: Box<Removal>,
        /// Blob store failure.
        #[source]
        source: StorageError,
    },

    /// Storing the uploaded blob failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MediaError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(id: AttachmentId) -> Self {
        Self::NotFound(id)
    }

    /// Create an invalid parent error.
    #[must_use]
    pub fn invalid_parent(parent: ParentRef) -> Self {
        Self::InvalidParent(parent)
    }

    /// Create an invalid index error.
    #[must_use]
    pub fn invalid_index(requested: u32, count: usize) -> Self {
        Self::InvalidIndex { requested, count }
    }

    /// Create a non-retryable store failure.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreTransactionFailure {
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a store failure caused by a concurrent writer.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::StoreTransactionFailure {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the engine may transparently re-run the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreTransactionFailure {
                retryable: true,
                ..
            }
        )
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        let message = err.to_string();
        match err {
            MediaError::InvalidParent(_) | MediaError::NotFound(_) => Self::NotFound(message),
            MediaError::InvalidIndex { .. } | MediaError::InvalidAttachment(_) => {
                Self::Validation(message)
            }
            MediaError::LastAttachmentConflict { .. } => Self::LastAttachment(message),
            MediaError::DuplicateParent(_) => Self::Conflict(message),
            MediaError::StoreTransactionFailure {
                retryable: true, ..
            } => Self::Unavailable(message),
            MediaError::StoreTransactionFailure {
                retryable: false, ..
            } => Self::Database(message),
            MediaError::BlobDeletionFailure { .. } => Self::ExternalService(message),
            MediaError::Storage(storage) if storage.is_rejected_upload() => {
                Self::Validation(message)
            }
            MediaError::Storage(_) => Self::ExternalService(message),
        }
    }
}
