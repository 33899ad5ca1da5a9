//! Parent aggregate guard.
//!
//! A parent that still exists must keep at least one attachment. The guard
//! is consulted before anything is written: on creation the parent must
//! arrive with at least one file, and a delete may not take its last one.
//! Destroying the parent itself bypasses it.

use super::error::MediaError;
use super::types::{ParentKind, ParentRef};

/// Stateless rule protecting a parent's last attachment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentAggregateGuard;

impl ParentAggregateGuard {
    /// Allow creating a parent only if it comes with `files` attachments.
    pub fn check_create(kind: ParentKind, files: usize) -> Result<(), MediaError> {
        if files == 0 {
            return Err(MediaError::InvalidAttachment(format!(
                "a new {} needs at least one attachment",
                kind.as_str()
            )));
        }
        Ok(())
    }

    /// Allow a delete only if `remaining` siblings would be left behind.
    pub fn check_delete(parent: ParentRef, remaining: usize) -> Result<(), MediaError> {
        if remaining == 0 {
            return Err(MediaError::LastAttachmentConflict { parent });
        }
        Ok(())
    }
}
