//! Media service.
//!
//! Pairs the ordering engine with a blob store. Ledger changes are the source
//! of truth: blob failures after a committed ledger change are reported but
//! never rolled back.

use std::sync::Arc;

use adopet_shared::types::AttachmentId;
use tracing::warn;

use super::engine::OrderingEngine;
use super::error::MediaError;
use super::ledger::AttachmentLedger;
use super::guard::ParentAggregateGuard;
use super::types::{
    Attachment, Creation, NewAttachment, NewParent, ParentRef, PendingAttachment, Placement,
    Removal, Teardown,
};
use crate::storage::{BlobStore, BlobUpload};

/// Attachment operations spanning the ledger and the blob store.
#[derive(Debug)]
pub struct MediaService<L: AttachmentLedger, B: BlobStore> {
    engine: OrderingEngine<L>,
    blobs: Arc<B>,
}

impl<L: AttachmentLedger, B: BlobStore> Clone for MediaService<L, B> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            blobs: Arc::clone(&self.blobs),
        }
    }
}

impl<L: AttachmentLedger, B: BlobStore> MediaService<L, B> {
    /// Create a service over injected ledger and blob store handles.
    #[must_use]
    pub fn new(ledger: Arc<L>, blobs: Arc<B>) -> Self {
        Self {
            engine: OrderingEngine::new(ledger),
            blobs,
        }
    }

    /// The ordering engine.
    #[must_use]
    pub fn engine(&self) -> &OrderingEngine<L> {
        &self.engine
    }

    /// Create a parent entity from its first uploads.
    ///
    /// Every file is uploaded under [`NewParent::folder`] before the ledger
    /// is touched; the parent and its records are then written in one
    /// transaction at indices `0..n-1`. Any failure deletes the blobs
    /// uploaded so far.
    ///
    /// # Errors
    ///
    /// - `InvalidAttachment` if `uploads` is empty (nothing is uploaded)
    /// - `Storage` if an upload is rejected or fails
    /// - any engine creation error
    pub async fn create_parent_with(
        &self,
        parent: NewParent,
        uploads: Vec<BlobUpload>,
    ) -> Result<Creation, MediaError> {
        ParentAggregateGuard::check_create(parent.kind(), uploads.len())?;

        let folder = parent.folder();
        let mut pending = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let filename = upload.filename.clone();
            match self.blobs.upload(&folder, upload).await {
                Ok(blob) => pending.push(PendingAttachment::new(blob, filename)),
                Err(err) => {
                    self.discard(&pending).await;
                    return Err(err.into());
                }
            }
        }

        match self.engine.create_parent(parent, pending.clone()).await {
            Ok(creation) => Ok(creation),
            Err(err) => {
                self.discard(&pending).await;
                Err(err)
            }
        }
    }

    /// Upload a file and record it for `parent`.
    ///
    /// If the ledger insert fails the uploaded blob is deleted again.
    ///
    /// # Errors
    ///
    /// - `InvalidParent` if the parent does not exist (nothing is uploaded)
    /// - `Storage` if the upload is rejected or fails
    /// - any insert error
    pub async fn attach(
        &self,
        parent: ParentRef,
        folder: &str,
        upload: BlobUpload,
        placement: Placement,
    ) -> Result<Attachment, MediaError> {
        if !self.engine.parent_exists(parent).await? {
            return Err(MediaError::invalid_parent(parent));
        }

        let filename = upload.filename.clone();
        let blob = self.blobs.upload(folder, upload).await?;
        let meta = NewAttachment::from_blob(parent, &blob, &filename);

        match self.engine.insert(meta, placement).await {
            Ok(attachment) => Ok(attachment),
            Err(err) => {
                self.discard_blob(&blob.key).await;
                Err(err)
            }
        }
    }

    /// Delete an attachment of `parent` and its blob.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the attachment does not exist or belongs to another
    ///   parent
    /// - any other engine delete error, in which case nothing changed
    /// - `BlobDeletionFailure` if the ledger delete committed but the blob
    ///   could not be removed
    pub async fn remove(
        &self,
        parent: ParentRef,
        id: AttachmentId,
    ) -> Result<Removal, MediaError> {
        let removal = self.engine.delete_from(parent, id).await?;

        if let Err(source) = self.blobs.delete(&removal.removed.path).await {
            warn!(
                attachment_id = %id,
                key = %removal.removed.path,
                error = %source,
                "Attachment removed but blob deletion failed"
            );
            return Err(MediaError::BlobDeletionFailure {
                removal: Box::new(removal),
                source,
            });
        }

        Ok(removal)
    }

    /// See [`OrderingEngine::promote_within`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the attachment does not exist or belongs to
    /// another parent.
    pub async fn promote_to_primary(
        &self,
        parent: ParentRef,
        id: AttachmentId,
    ) -> Result<Vec<Attachment>, MediaError> {
        self.engine.promote_within(parent, id).await
    }

    /// See [`OrderingEngine::list_ordered`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidParent` if the parent does not exist.
    pub async fn list_ordered(&self, parent: ParentRef) -> Result<Vec<Attachment>, MediaError> {
        self.engine.list_ordered(parent).await
    }

    /// See [`OrderingEngine::get`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the attachment does not exist.
    pub async fn get(&self, id: AttachmentId) -> Result<Attachment, MediaError> {
        self.engine.get(id).await
    }

    /// Destroy a parent and purge the blobs of everything it owned.
    ///
    /// Blobs that cannot be deleted are listed in
    /// [`Teardown::orphaned_keys`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidParent` if the parent does not exist.
    pub async fn destroy_parent(&self, parent: ParentRef) -> Result<Teardown, MediaError> {
        let removed = self.engine.destroy_parent(parent).await?;

        let mut orphaned_keys = Vec::new();
        for attachment in &removed {
            if let Err(err) = self.blobs.delete(&attachment.path).await {
                warn!(
                    parent = %parent,
                    key = %attachment.path,
                    error = %err,
                    "Blob left behind after parent teardown"
                );
                orphaned_keys.push(attachment.path.clone());
            }
        }

        Ok(Teardown {
            removed,
            orphaned_keys,
        })
    }

    /// Public URL of an attachment, when the blob store serves one.
    #[must_use]
    pub fn public_url(&self, attachment: &Attachment) -> Option<String> {
        self.blobs.public_url(&attachment.path)
    }

    async fn discard(&self, pending: &[PendingAttachment]) {
        for file in pending {
            self.discard_blob(&file.blob.key).await;
        }
    }

    /// Delete a blob no record points to; failures are only logged.
    async fn discard_blob(&self, key: &str) {
        if let Err(err) = self.blobs.delete(key).await {
            warn!(key = %key, error = %err, "Failed to delete blob of rejected attachment");
        }
    }
}
