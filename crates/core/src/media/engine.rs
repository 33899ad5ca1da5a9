//! Ordering engine.
//!
//! Runs every ordering mutation as a single ledger transaction:
//!
//! ```text
//! begin ─► find target ─► lock parent ─► load siblings ─► plan ─► write ─► commit
//! ```
//!
//! A transaction that fails with a retryable conflict is re-run exactly once.

use std::future::Future;
use std::sync::Arc;

use adopet_shared::types::AttachmentId;
use tracing::{debug, info, warn};

use super::error::MediaError;
use super::guard::ParentAggregateGuard;
use super::ledger::{AttachmentLedger, LedgerTransaction};
use super::ordering;
use super::types::{
    Attachment, Creation, NewAttachment, NewParent, ParentRef, PendingAttachment, Placement,
    Removal,
};

/// Keeps every parent's attachments contiguous and correctly ordered.
#[derive(Debug)]
pub struct OrderingEngine<L: AttachmentLedger> {
    ledger: Arc<L>,
}

impl<L: AttachmentLedger> Clone for OrderingEngine<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<L: AttachmentLedger> OrderingEngine<L> {
    /// Create an engine over an injected ledger handle.
    #[must_use]
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// The underlying ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Record a new attachment for its parent.
    ///
    /// [`Placement::Append`] assigns `order_index = count`. [`Placement::At`]
    /// accepts `0..=count`; the record is appended and then moved to the
    /// requested slot in the same transaction, shifting later siblings.
    ///
    /// # Errors
    ///
    /// - `InvalidAttachment` if the metadata is unusable
    /// - `InvalidParent` if the parent does not exist
    /// - `InvalidIndex` if the requested slot is out of range
    pub async fn insert(
        &self,
        meta: NewAttachment,
        placement: Placement,
    ) -> Result<Attachment, MediaError> {
        validate(&meta)?;
        with_retry("insert", || self.try_insert(meta.clone(), placement)).await
    }

    /// Create a parent entity together with its attachments.
    ///
    /// The parent row and every record are written in one transaction, at
    /// indices `0..n-1` in the order given, so the parent is never visible
    /// without an attachment.
    ///
    /// # Errors
    ///
    /// - `InvalidAttachment` if `files` is empty or a file is unusable
    /// - `DuplicateParent` if a unique key of the entity is taken
    pub async fn create_parent(
        &self,
        parent: NewParent,
        files: Vec<PendingAttachment>,
    ) -> Result<Creation, MediaError> {
        ParentAggregateGuard::check_create(parent.kind(), files.len())?;
        with_retry("create_parent", || self.try_create_parent(parent.clone(), &files)).await
    }

    /// Remove an attachment and close the gap it leaves.
    ///
    /// Returns the pre-delete snapshot so the caller can purge the blob.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the attachment does not exist
    /// - `LastAttachmentConflict` if it is the parent's only attachment
    pub async fn delete(&self, id: AttachmentId) -> Result<Removal, MediaError> {
        with_retry("delete", || self.try_delete(id, None)).await
    }

    /// Like [`Self::delete`], but only for an attachment of `parent`.
    ///
    /// # Errors
    ///
    /// Also returns `NotFound` if the attachment belongs to another parent.
    pub async fn delete_from(
        &self,
        parent: ParentRef,
        id: AttachmentId,
    ) -> Result<Removal, MediaError> {
        with_retry("delete", || self.try_delete(id, Some(parent))).await
    }

    /// Make an attachment the primary one, keeping the others in order.
    ///
    /// Returns the parent's attachments in their new order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the attachment does not exist.
    pub async fn promote_to_primary(&self, id: AttachmentId) -> Result<Vec<Attachment>, MediaError> {
        with_retry("promote_to_primary", || self.try_promote(id, None)).await
    }

    /// Like [`Self::promote_to_primary`], but only for an attachment of
    /// `parent`.
    ///
    /// # Errors
    ///
    /// Also returns `NotFound` if the attachment belongs to another parent.
    pub async fn promote_within(
        &self,
        parent: ParentRef,
        id: AttachmentId,
    ) -> Result<Vec<Attachment>, MediaError> {
        with_retry("promote_to_primary", || self.try_promote(id, Some(parent))).await
    }

    /// A parent's attachments ascending by `order_index`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParent` if the parent does not exist.
    pub async fn list_ordered(&self, parent: ParentRef) -> Result<Vec<Attachment>, MediaError> {
        let mut txn = self.ledger.begin().await?;
        if !txn.parent_exists(parent).await? {
            return Err(MediaError::invalid_parent(parent));
        }
        let attachments = txn.siblings(parent).await?;
        txn.commit().await?;
        Ok(attachments)
    }

    /// Fetch one attachment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the attachment does not exist.
    pub async fn get(&self, id: AttachmentId) -> Result<Attachment, MediaError> {
        let mut txn = self.ledger.begin().await?;
        let found = txn.find(id).await?;
        txn.commit().await?;
        found.ok_or_else(|| MediaError::not_found(id))
    }

    /// Whether the parent entity exists.
    pub async fn parent_exists(&self, parent: ParentRef) -> Result<bool, MediaError> {
        let mut txn = self.ledger.begin().await?;
        let exists = txn.parent_exists(parent).await?;
        txn.commit().await?;
        Ok(exists)
    }

    /// Delete a parent entity and all of its attachments.
    ///
    /// The last-attachment guard does not apply. Returns the removed records
    /// so their blobs can be purged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParent` if the parent does not exist.
    pub async fn destroy_parent(&self, parent: ParentRef) -> Result<Vec<Attachment>, MediaError> {
        with_retry("destroy_parent", || self.try_destroy_parent(parent)).await
    }

    async fn try_create_parent(
        &self,
        new_parent: NewParent,
        files: &[PendingAttachment],
    ) -> Result<Creation, MediaError> {
        let external_id = new_parent.external_id();
        let mut txn = self.ledger.begin().await?;

        let parent = txn.create_parent(new_parent).await?;

        let mut attachments = Vec::with_capacity(files.len());
        for (slot, file) in files.iter().enumerate() {
            let meta = file.bind(parent);
            validate(&meta)?;
            let order_index = ordering::append_index(slot)?;
            attachments.push(txn.insert(meta, order_index).await?);
        }

        txn.commit().await?;

        info!(
            parent = %parent,
            external_id = %external_id,
            attachments = attachments.len(),
            "Parent created"
        );
        Ok(Creation {
            parent,
            external_id,
            attachments,
        })
    }

    async fn try_insert(
        &self,
        meta: NewAttachment,
        placement: Placement,
    ) -> Result<Attachment, MediaError> {
        let parent = meta.parent;
        let mut txn = self.ledger.begin().await?;

        if !txn.lock_parent(parent).await? {
            return Err(MediaError::invalid_parent(parent));
        }

        let mut siblings = txn.siblings(parent).await?;
        let slot = ordering::resolve_placement(placement, siblings.len())?;

        let heal = ordering::compact(&siblings);
        if !heal.is_empty() {
            warn!(parent = %parent, changes = heal.len(), "Repairing non-contiguous order before insert");
            txn.reindex(&heal).await?;
            ordering::apply(&mut siblings, &heal);
        }

        let end = ordering::append_index(siblings.len())?;
        let mut created = txn.insert(meta, end).await?;

        if slot < end {
            siblings.push(created.clone());
            let plan = ordering::move_to(&siblings, created.id, slot).unwrap_or_default();
            debug!(parent = %parent, slot, changes = plan.len(), "Placing new attachment");
            txn.reindex(&plan).await?;
            created.order_index = slot;
        }

        txn.commit().await?;

        info!(
            parent = %parent,
            attachment_id = %created.external_id,
            order_index = created.order_index,
            "Attachment inserted"
        );
        Ok(created)
    }

    async fn try_delete(
        &self,
        id: AttachmentId,
        expected: Option<ParentRef>,
    ) -> Result<Removal, MediaError> {
        let mut txn = self.ledger.begin().await?;

        let target = find_owned(&mut txn, id, expected).await?;
        let parent = target.parent;

        // A parent destroyed since the lookup took the attachment with it.
        if !txn.lock_parent(parent).await? {
            return Err(MediaError::not_found(id));
        }

        // Re-read under the lock: a concurrent writer may have removed or moved it.
        let siblings = txn.siblings(parent).await?;
        let Some(target) = siblings.iter().find(|a| a.id == target.id).cloned() else {
            return Err(MediaError::not_found(id));
        };
        let remaining: Vec<Attachment> = siblings
            .into_iter()
            .filter(|a| a.id != target.id)
            .collect();

        ParentAggregateGuard::check_delete(parent, remaining.len())?;

        txn.remove(target.id).await?;
        let plan = ordering::compact(&remaining);
        debug!(parent = %parent, changes = plan.len(), "Compacting after delete");
        txn.reindex(&plan).await?;

        txn.commit().await?;

        info!(
            parent = %parent,
            attachment_id = %id,
            was_primary = target.is_primary(),
            "Attachment deleted"
        );
        Ok(Removal {
            parent,
            removed: target,
        })
    }

    async fn try_promote(
        &self,
        id: AttachmentId,
        expected: Option<ParentRef>,
    ) -> Result<Vec<Attachment>, MediaError> {
        let mut txn = self.ledger.begin().await?;

        let target = find_owned(&mut txn, id, expected).await?;
        let parent = target.parent;

        if !txn.lock_parent(parent).await? {
            return Err(MediaError::not_found(id));
        }

        let mut siblings = txn.siblings(parent).await?;
        let plan =
            ordering::promote(&siblings, target.id).ok_or_else(|| MediaError::not_found(id))?;
        debug!(parent = %parent, changes = plan.len(), "Promoting attachment");
        txn.reindex(&plan).await?;

        txn.commit().await?;

        ordering::apply(&mut siblings, &plan);
        ordering::sort_siblings(&mut siblings);

        info!(parent = %parent, attachment_id = %id, "Attachment promoted to primary");
        Ok(siblings)
    }

    async fn try_destroy_parent(&self, parent: ParentRef) -> Result<Vec<Attachment>, MediaError> {
        let mut txn = self.ledger.begin().await?;

        if !txn.lock_parent(parent).await? {
            return Err(MediaError::invalid_parent(parent));
        }

        let removed = txn.siblings(parent).await?;
        txn.remove_parent(parent).await?;
        txn.commit().await?;

        info!(parent = %parent, attachments = removed.len(), "Parent destroyed");
        Ok(removed)
    }
}

/// Look up an attachment, treating one owned by a parent other than
/// `expected` as absent.
async fn find_owned<T: LedgerTransaction>(
    txn: &mut T,
    id: AttachmentId,
    expected: Option<ParentRef>,
) -> Result<Attachment, MediaError> {
    match txn.find(id).await? {
        Some(found) if expected.is_none_or(|parent| parent == found.parent) => Ok(found),
        _ => Err(MediaError::not_found(id)),
    }
}

/// Reject metadata that can never form a valid record.
fn validate(meta: &NewAttachment) -> Result<(), MediaError> {
    if meta.size <= 0 {
        return Err(MediaError::InvalidAttachment(format!(
            "size must be positive, got {}",
            meta.size
        )));
    }
    if meta.path.trim().is_empty() {
        return Err(MediaError::InvalidAttachment("path is empty".to_string()));
    }
    Ok(())
}

/// Run `attempt`, re-running it once if it fails with a retryable conflict.
async fn with_retry<T, F, Fut>(operation: &'static str, mut attempt: F) -> Result<T, MediaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MediaError>>,
{
    match attempt().await {
        Err(err) if err.is_retryable() => {
            warn!(operation, error = %err, "Ledger conflict, retrying once");
            attempt().await
        }
        result => result,
    }
}
