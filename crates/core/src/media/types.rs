//! Attachment types and data structures.

use std::fmt;

use adopet_shared::types::{AttachmentId, PetId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::StoredBlob;

/// Kind of entity that owns a collection of attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    /// Pet photos.
    Pet,
    /// User avatars.
    User,
}

impl ParentKind {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pet => "pet",
            Self::User => "user",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pet" => Some(Self::Pet),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// Reference to the entity owning a collection of attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParentRef {
    /// Entity kind.
    pub kind: ParentKind,
    /// Internal numeric id of the entity.
    pub id: i64,
}

impl ParentRef {
    /// Reference to a pet.
    #[must_use]
    pub const fn pet(id: i64) -> Self {
        Self {
            kind: ParentKind::Pet,
            id,
        }
    }

    /// Reference to a user.
    #[must_use]
    pub const fn user(id: i64) -> Self {
        Self {
            kind: ParentKind::User,
            id,
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// A parent entity to be created together with its first attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewParent {
    /// A pet listed for adoption.
    Pet {
        /// Public id assigned up front so blobs can be filed under it.
        external_id: PetId,
        /// Display name.
        name: String,
        /// Species, e.g. `dog`.
        species: String,
    },
    /// A registered user.
    User {
        /// Public id assigned up front so blobs can be filed under it.
        external_id: UserId,
        /// Display name.
        name: String,
        /// Unique login email.
        email: String,
    },
}

impl NewParent {
    /// A new pet with a fresh public id.
    #[must_use]
    pub fn pet(name: impl Into<String>, species: impl Into<String>) -> Self {
        Self::Pet {
            external_id: PetId::new(),
            name: name.into(),
            species: species.into(),
        }
    }

    /// A new user with a fresh public id.
    #[must_use]
    pub fn user(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::User {
            external_id: UserId::new(),
            name: name.into(),
            email: email.into(),
        }
    }

    /// Kind of the entity.
    #[must_use]
    pub const fn kind(&self) -> ParentKind {
        match self {
            Self::Pet { .. } => ParentKind::Pet,
            Self::User { .. } => ParentKind::User,
        }
    }

    /// Public id of the entity.
    #[must_use]
    pub const fn external_id(&self) -> Uuid {
        match self {
            Self::Pet { external_id, .. } => external_id.into_inner(),
            Self::User { external_id, .. } => external_id.into_inner(),
        }
    }

    /// Blob store folder for the entity's files, e.g. `pets/<uuid>`.
    #[must_use]
    pub fn folder(&self) -> String {
        format!("{}s/{}", self.kind().as_str(), self.external_id())
    }
}

/// Where a new attachment goes in its parent's display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// After every existing attachment.
    #[default]
    Append,
    /// At an explicit zero-based slot; later siblings shift up by one.
    At(u32),
}

impl Placement {
    /// Upload as the new primary attachment.
    pub const PRIMARY: Self = Self::At(0);
}

impl From<Option<u32>> for Placement {
    fn from(index: Option<u32>) -> Self {
        index.map_or(Self::Append, Self::At)
    }
}

/// Metadata of a stored blob about to be recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    /// Owning entity.
    pub parent: ParentRef,
    /// Blob store key.
    pub path: String,
    /// Full MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Filename extension without the dot.
    pub extension: String,
    /// Coarse MIME category, e.g. `image`.
    pub kind: String,
    /// Free text.
    pub description: String,
}

impl NewAttachment {
    /// Derive ledger metadata from a stored blob and the client filename.
    #[must_use]
    pub fn from_blob(parent: ParentRef, blob: &StoredBlob, filename: &str) -> Self {
        Self {
            parent,
            path: blob.key.clone(),
            mime_type: blob.content_type.clone(),
            size: i64::try_from(blob.size).unwrap_or(i64::MAX),
            extension: extension_of(filename).to_string(),
            kind: mime_category(&blob.content_type).to_string(),
            description: String::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An uploaded blob waiting to be recorded for a parent that is created in
/// the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    /// The stored blob.
    pub blob: StoredBlob,
    /// Client filename the blob was uploaded under.
    pub filename: String,
}

impl PendingAttachment {
    /// Wrap a stored blob.
    #[must_use]
    pub fn new(blob: StoredBlob, filename: impl Into<String>) -> Self {
        Self {
            blob,
            filename: filename.into(),
        }
    }

    /// Ledger metadata for this blob once `parent` exists.
    #[must_use]
    pub fn bind(&self, parent: ParentRef) -> NewAttachment {
        NewAttachment::from_blob(parent, &self.blob, &self.filename)
    }
}

/// One stored file belonging to a parent entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    /// Internal ledger key. Never exposed to clients.
    #[serde(skip)]
    pub id: i64,
    /// Opaque identifier safe to expose.
    pub external_id: AttachmentId,
    /// Owning entity.
    #[serde(skip)]
    pub parent: ParentRef,
    /// Blob store key.
    pub path: String,
    /// Full MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Filename extension without the dot.
    pub extension: String,
    /// Coarse MIME category.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free text.
    pub description: String,
    /// Zero-based display position; `0` is the primary attachment.
    pub order_index: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Attachment {
    /// Whether this is the primary (first shown) attachment.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.order_index == 0
    }
}

/// Snapshot returned by a committed delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Parent the attachment belonged to.
    pub parent: ParentRef,
    /// The record as it was before deletion.
    pub removed: Attachment,
}

/// A parent created together with its attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creation {
    /// Ledger reference of the new parent.
    pub parent: ParentRef,
    /// Public id of the new parent.
    pub external_id: Uuid,
    /// Its attachments at indices `0..n-1`.
    pub attachments: Vec<Attachment>,
}

/// Everything removed when a parent entity is destroyed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Teardown {
    /// Attachments removed from the ledger.
    pub removed: Vec<Attachment>,
    /// Keys whose blobs could not be deleted.
    pub orphaned_keys: Vec<String>,
}

/// Extension of `filename` without the dot, empty when there is none.
#[must_use]
pub fn extension_of(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map_or("", |(_, ext)| ext)
}

/// Part of a MIME type before the `/`.
#[must_use]
pub fn mime_category(mime_type: &str) -> &str {
    mime_type.split('/').next().unwrap_or_default()
}
