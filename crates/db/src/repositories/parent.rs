//! Parent entity repository.
//!
//! Pets and users own attachment collections. This repository looks them up
//! and translates their public UUIDs into ledger parent references.

use adopet_core::media::{NewParent, ParentKind, ParentRef};
use adopet_shared::types::{PetId, UserId};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set,
};
use uuid::Uuid;

use crate::entities::{pets, users};

/// Repository for the entities that own attachments.
#[derive(Debug, Clone)]
pub struct ParentRepository {
    db: DatabaseConnection,
}

impl ParentRepository {
    /// Creates a new parent repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a parent entity outside any ledger transaction.
    ///
    /// Prefer the media service's parent creation, which records the first
    /// attachments atomically; this is for fixtures and imports.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails (e.g. duplicate email).
    pub async fn create(&self, parent: NewParent) -> Result<ParentRef, DbErr> {
        insert_parent(&self.db, parent).await
    }

    /// Finds a pet by its public id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_pet(&self, id: PetId) -> Result<Option<pets::Model>, DbErr> {
        pets::Entity::find()
            .filter(pets::Column::ExternalId.eq(id.into_inner()))
            .one(&self.db)
            .await
    }

    /// Finds a user by its public id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_user(&self, id: UserId) -> Result<Option<users::Model>, DbErr> {
        users::Entity::find()
            .filter(users::Column::ExternalId.eq(id.into_inner()))
            .one(&self.db)
            .await
    }

    /// Resolves a public parent id to a ledger reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn resolve(
        &self,
        kind: ParentKind,
        external_id: Uuid,
    ) -> Result<Option<ParentRef>, DbErr> {
        let parent = match kind {
            ParentKind::Pet => self
                .find_pet(PetId::from_uuid(external_id))
                .await?
                .map(|pet| ParentRef::pet(pet.id)),
            ParentKind::User => self
                .find_user(UserId::from_uuid(external_id))
                .await?
                .map(|user| ParentRef::user(user.id)),
        };

        Ok(parent)
    }
}

/// Insert the row for a new parent entity.
pub(crate) async fn insert_parent<C: ConnectionTrait>(
    db: &C,
    parent: NewParent,
) -> Result<ParentRef, DbErr> {
    let now = chrono::Utc::now().into();

    match parent {
        NewParent::Pet {
            external_id,
            name,
            species,
        } => {
            let pet = pets::ActiveModel {
                external_id: Set(external_id.into_inner()),
                name: Set(name),
                species: Set(species),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?;
            Ok(ParentRef::pet(pet.id))
        }
        NewParent::User {
            external_id,
            name,
            email,
        } => {
            let user = users::ActiveModel {
                external_id: Set(external_id.into_inner()),
                name: Set(name),
                email: Set(email),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?;
            Ok(ParentRef::user(user.id))
        }
    }
}
