//! Display-order planning.
//!
//! Pure functions that compute which order indices must change for a given
//! mutation. They never touch a ledger; the engine applies the resulting
//! [`Reindex`] plan inside a transaction.
//!
//! Every planner expects its input sorted ascending by `order_index` (ties
//! broken by internal id), which is the order ledgers return siblings in.

use std::collections::BTreeMap;

use thiserror::Error;

use super::error::MediaError;
use super::types::{Attachment, ParentRef, Placement};

/// A single order-index change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reindex {
    /// Internal id of the attachment.
    pub id: i64,
    /// Index before the change.
    pub from: u32,
    /// Index after the change.
    pub to: u32,
}

/// Ways a parent's order indices can be inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderViolation {
    /// Two attachments share an index.
    #[error("order index {0} is used more than once")]
    Duplicate(u32),
    /// The sequence skips an index (index 0 missing means no primary).
    #[error("expected order index {expected}, found {found}")]
    Gap {
        /// First index that is missing.
        expected: u32,
        /// Index found in its place.
        found: u32,
    },
}

/// A parent whose attachments violate the ordering invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentViolation {
    /// Offending parent.
    pub parent: ParentRef,
    /// Number of attachments it has.
    pub count: usize,
    /// First violation found.
    pub violation: OrderViolation,
}

/// Index assigned to an appended attachment.
pub fn append_index(count: usize) -> Result<u32, MediaError> {
    u32::try_from(count).map_err(|_| MediaError::store("attachment count exceeds u32"))
}

/// Resolve a requested placement against the current sibling count.
///
/// Valid slots are `0..=count`.
pub fn resolve_placement(placement: Placement, count: usize) -> Result<u32, MediaError> {
    let end = append_index(count)?;
    match placement {
        Placement::Append => Ok(end),
        Placement::At(slot) if slot <= end => Ok(slot),
        Placement::At(slot) => Err(MediaError::invalid_index(slot, count)),
    }
}

/// Renumber `remaining` to `0..n-1`, keeping their relative order.
///
/// Only rows whose index actually changes are returned.
#[must_use]
pub fn compact(remaining: &[Attachment]) -> Vec<Reindex> {
    renumber(remaining.iter(), 0)
}

/// Move attachment `id` to `slot`, shifting the others to keep `0..n-1`.
///
/// The relative order of every other sibling is preserved. Returns `None`
/// when `id` is not among `siblings`. A `slot` past the end is clamped to
/// the last position.
#[must_use]
pub fn move_to(siblings: &[Attachment], id: i64, slot: u32) -> Option<Vec<Reindex>> {
    let target = siblings.iter().find(|a| a.id == id)?;
    let mut order: Vec<&Attachment> = siblings.iter().filter(|a| a.id != id).collect();
    let slot = usize::try_from(slot).map_or(order.len(), |s| s.min(order.len()));
    order.insert(slot, target);

    Some(renumber(order.into_iter(), 0))
}

/// Make attachment `id` the primary, keeping the others in relative order.
#[must_use]
pub fn promote(siblings: &[Attachment], id: i64) -> Option<Vec<Reindex>> {
    move_to(siblings, id, 0)
}

/// Apply a plan to in-memory records.
pub fn apply(records: &mut [Attachment], plan: &[Reindex]) {
    for change in plan {
        if let Some(record) = records.iter_mut().find(|a| a.id == change.id) {
            record.order_index = change.to;
        }
    }
}

/// Sort records the way ledgers return siblings.
pub fn sort_siblings(records: &mut [Attachment]) {
    records.sort_by_key(|a| (a.order_index, a.id));
}

/// Check that one parent's attachments use exactly `0..n-1`.
pub fn verify(attachments: &[Attachment]) -> Result<(), OrderViolation> {
    let mut indices: Vec<u32> = attachments.iter().map(|a| a.order_index).collect();
    indices.sort_unstable();

    let mut expected = 0u32;
    for (position, &found) in indices.iter().enumerate() {
        if position > 0 && indices[position - 1] == found {
            return Err(OrderViolation::Duplicate(found));
        }
        if found != expected {
            return Err(OrderViolation::Gap { expected, found });
        }
        expected += 1;
    }

    Ok(())
}

/// Group rows by parent and report every parent that fails [`verify`].
pub fn audit(rows: impl IntoIterator<Item = Attachment>) -> Vec<ParentViolation> {
    let mut by_parent: BTreeMap<ParentRef, Vec<Attachment>> = BTreeMap::new();
    for row in rows {
        by_parent.entry(row.parent).or_default().push(row);
    }

    by_parent
        .into_iter()
        .filter_map(|(parent, attachments)| {
            verify(&attachments).err().map(|violation| ParentViolation {
                parent,
                count: attachments.len(),
                violation,
            })
        })
        .collect()
}

fn renumber<'a>(order: impl Iterator<Item = &'a Attachment>, start: u32) -> Vec<Reindex> {
    order
        .zip(start..)
        .filter(|(a, to)| a.order_index != *to)
        .map(|(a, to)| Reindex {
            id: a.id,
            from: a.order_index,
            to,
        })
        .collect()
}
