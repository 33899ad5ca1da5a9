//! Attachment ledger contract.
//!
//! The ledger is the persistent table of attachment records. The ordering
//! engine drives it through a [`LedgerTransaction`]: every engine operation
//! begins one transaction, performs all of its reads and writes through it,
//! and commits once. Dropping a transaction without committing discards every
//! write made through it.
//!
//! Implementations must serialize transactions that lock the same parent:
//! after [`LedgerTransaction::lock_parent`] returns, no other transaction may
//! modify that parent's attachments until this one ends.

use std::future::Future;

use adopet_shared::types::AttachmentId;

use super::error::MediaError;
use super::ordering::Reindex;
use super::types::{Attachment, NewAttachment, NewParent, ParentRef};

/// Persistent store of attachment records.
///
/// Implemented by the db crate for PostgreSQL and by
/// [`super::InMemoryLedger`] for tests.
pub trait AttachmentLedger: Send + Sync {
    /// Transaction handle type.
    type Transaction: LedgerTransaction;

    /// Start a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, MediaError>> + Send;
}

/// One atomic unit of work against the ledger.
pub trait LedgerTransaction: Send {
    /// Check whether the parent exists without locking it.
    fn parent_exists(
        &mut self,
        parent: ParentRef,
    ) -> impl Future<Output = Result<bool, MediaError>> + Send;

    /// Lock the parent's attachment set until the transaction ends.
    ///
    /// Returns `false` if the parent does not exist.
    fn lock_parent(
        &mut self,
        parent: ParentRef,
    ) -> impl Future<Output = Result<bool, MediaError>> + Send;

    /// Create a parent entity and lock it until the transaction ends.
    ///
    /// Fails with `DuplicateParent` if a unique key of the entity is taken.
    fn create_parent(
        &mut self,
        parent: NewParent,
    ) -> impl Future<Output = Result<ParentRef, MediaError>> + Send;

    /// Look up an attachment by its external id.
    fn find(
        &mut self,
        id: AttachmentId,
    ) -> impl Future<Output = Result<Option<Attachment>, MediaError>> + Send;

    /// All attachments of a parent, ascending by `(order_index, id)`.
    fn siblings(
        &mut self,
        parent: ParentRef,
    ) -> impl Future<Output = Result<Vec<Attachment>, MediaError>> + Send;

    /// Persist a new record at `order_index`.
    fn insert(
        &mut self,
        meta: NewAttachment,
        order_index: u32,
    ) -> impl Future<Output = Result<Attachment, MediaError>> + Send;

    /// Delete one record by internal id.
    fn remove(&mut self, id: i64) -> impl Future<Output = Result<(), MediaError>> + Send;

    /// Apply order-index changes.
    fn reindex(&mut self, plan: &[Reindex]) -> impl Future<Output = Result<(), MediaError>> + Send;

    /// Delete the parent entity together with every attachment it owns.
    fn remove_parent(
        &mut self,
        parent: ParentRef,
    ) -> impl Future<Output = Result<(), MediaError>> + Send;

    /// Make every write of this transaction durable.
    fn commit(self) -> impl Future<Output = Result<(), MediaError>> + Send;
}
