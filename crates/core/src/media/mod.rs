//! Ordered media attachments.
//!
//! This module keeps each parent's attachments in a dense display order:
//! - Ordering planners (append, compact, promote, move)
//! - Parent aggregate guard (a parent keeps at least one attachment)
//! - Ledger contract and an in-memory ledger
//! - Ordering engine running each mutation as one transaction
//! - Media service pairing the engine with a blob store

pub mod engine;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod memory;
pub mod ordering;
pub mod service;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use engine::OrderingEngine;
pub use error::MediaError;
pub use guard::ParentAggregateGuard;
pub use ledger::{AttachmentLedger, LedgerTransaction};
pub use memory::{InMemoryLedger, InMemoryTransaction};
pub use ordering::{OrderViolation, ParentViolation, Reindex};
pub use service::MediaService;
pub use types::{
    Attachment, Creation, NewAttachment, NewParent, ParentKind, ParentRef, PendingAttachment,
    Placement, Removal, Teardown,
};
