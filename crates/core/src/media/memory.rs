//! In-process attachment ledger.
//!
//! Holds the whole ledger behind one async mutex. A transaction owns the lock
//! for its lifetime and works on a private copy of the state, so an
//! uncommitted transaction leaves nothing behind when dropped.
//!
//! Commit enforces the same uniqueness the database does on
//! `(parent, order_index)`.
//!
//! Because every transaction takes the same lock, operations on different
//! parents never overlap either. Concurrency tests over this ledger check the
//! engine's results under contention but cannot produce interleaved
//! transactions; interleaving is covered by the PostgreSQL tests in the db
//! crate.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use adopet_shared::types::AttachmentId;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::MediaError;
use super::ledger::{AttachmentLedger, LedgerTransaction};
use super::ordering::{self, Reindex};
use super::types::{Attachment, NewAttachment, NewParent, ParentRef};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    parents: BTreeSet<ParentRef>,
    emails: BTreeMap<String, ParentRef>,
    rows: BTreeMap<i64, Attachment>,
    next_id: i64,
}

/// Ledger kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    pending_conflicts: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parent entity so attachments can be recorded for it.
    pub async fn add_parent(&self, parent: ParentRef) {
        self.state.lock().await.parents.insert(parent);
    }

    /// Every stored record, ascending by internal id.
    pub async fn snapshot(&self) -> Vec<Attachment> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    /// Make the next `count` commits fail with a retryable conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.fetch_add(count, Ordering::SeqCst);
    }
}

impl AttachmentLedger for InMemoryLedger {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, MediaError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            work,
            pending_conflicts: Arc::clone(&self.pending_conflicts),
        })
    }
}

/// Transaction over an [`InMemoryLedger`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    work: LedgerState,
    pending_conflicts: Arc<AtomicUsize>,
}

impl InMemoryTransaction {
    fn row_mut(&mut self, id: i64) -> Result<&mut Attachment, MediaError> {
        self.work
            .rows
            .get_mut(&id)
            .ok_or_else(|| MediaError::store(format!("attachment row {id} vanished")))
    }

    fn check_unique_order(&self) -> Result<(), MediaError> {
        let mut seen = HashSet::with_capacity(self.work.rows.len());
        for row in self.work.rows.values() {
            if !seen.insert((row.parent, row.order_index)) {
                return Err(MediaError::store(format!(
                    "duplicate order index {} for {}",
                    row.order_index, row.parent
                )));
            }
        }
        Ok(())
    }
}

impl LedgerTransaction for InMemoryTransaction {
    async fn parent_exists(&mut self, parent: ParentRef) -> Result<bool, MediaError> {
        Ok(self.work.parents.contains(&parent))
    }

    async fn lock_parent(&mut self, parent: ParentRef) -> Result<bool, MediaError> {
        // The whole ledger is already held by this transaction.
        Ok(self.work.parents.contains(&parent))
    }

    async fn create_parent(&mut self, parent: NewParent) -> Result<ParentRef, MediaError> {
        let kind = parent.kind();
        let id = self
            .work
            .parents
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.id)
            .max()
            .unwrap_or(0)
            + 1;
        let created = ParentRef { kind, id };

        if let NewParent::User { email, .. } = parent {
            if self.work.emails.contains_key(&email) {
                return Err(MediaError::DuplicateParent(format!("email {email}")));
            }
            self.work.emails.insert(email, created);
        }

        self.work.parents.insert(created);
        Ok(created)
    }

    async fn find(&mut self, id: AttachmentId) -> Result<Option<Attachment>, MediaError> {
        Ok(self
            .work
            .rows
            .values()
            .find(|row| row.external_id == id)
            .cloned())
    }

    async fn siblings(&mut self, parent: ParentRef) -> Result<Vec<Attachment>, MediaError> {
        let mut rows: Vec<Attachment> = self
            .work
            .rows
            .values()
            .filter(|row| row.parent == parent)
            .cloned()
            .collect();
        ordering::sort_siblings(&mut rows);
        Ok(rows)
    }

    async fn insert(
        &mut self,
        meta: NewAttachment,
        order_index: u32,
    ) -> Result<Attachment, MediaError> {
        if !self.work.parents.contains(&meta.parent) {
            return Err(MediaError::invalid_parent(meta.parent));
        }

        self.work.next_id += 1;
        let now = Utc::now();
        let row = Attachment {
            id: self.work.next_id,
            external_id: AttachmentId::new(),
            parent: meta.parent,
            path: meta.path,
            mime_type: meta.mime_type,
            size: meta.size,
            extension: meta.extension,
            kind: meta.kind,
            description: meta.description,
            order_index,
            created_at: now,
            updated_at: now,
        };
        self.work.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn remove(&mut self, id: i64) -> Result<(), MediaError> {
        self.work
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| MediaError::store(format!("attachment row {id} vanished")))
    }

    async fn reindex(&mut self, plan: &[Reindex]) -> Result<(), MediaError> {
        let now = Utc::now();
        for change in plan {
            let row = self.row_mut(change.id)?;
            row.order_index = change.to;
            row.updated_at = now;
        }
        Ok(())
    }

    async fn remove_parent(&mut self, parent: ParentRef) -> Result<(), MediaError> {
        self.work.rows.retain(|_, row| row.parent != parent);
        self.work.emails.retain(|_, owner| *owner != parent);
        self.work.parents.remove(&parent);
        Ok(())
    }

    async fn commit(self) -> Result<(), MediaError> {
        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(MediaError::conflict("could not serialize access"));
        }

        self.check_unique_order()?;

        let Self {
            mut guard, work, ..
        } = self;
        *guard = work;
        Ok(())
    }
}
