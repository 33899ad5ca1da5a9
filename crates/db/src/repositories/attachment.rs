//! PostgreSQL attachment ledger.
//!
//! Every ledger transaction runs at READ COMMITTED. Writers on the same
//! parent are serialized by `SELECT … FOR UPDATE` on the parent row; the
//! `(parent_kind, parent_id, order_index)` unique constraint is deferred to
//! commit so renumbering may pass through duplicate states.

use adopet_core::media::{
    Attachment, AttachmentLedger, LedgerTransaction, MediaError, NewAttachment, NewParent,
    ParentKind, ParentRef, ParentViolation, Reindex, ordering,
};
use adopet_shared::types::AttachmentId;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IsolationLevel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Set,
    TransactionTrait,
};

use crate::entities::{attachments, pets, users};
use crate::repositories::parent::insert_parent;

/// SQLSTATE codes a concurrent writer can cause.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Attachment ledger backed by the `attachments` table.
#[derive(Debug, Clone)]
pub struct AttachmentLedgerRepository {
    db: DatabaseConnection,
}

impl AttachmentLedgerRepository {
    /// Create a new attachment ledger repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Report every parent whose order indices are not exactly `0..n-1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub async fn audit(&self) -> Result<Vec<ParentViolation>, MediaError> {
        let models = attachments::Entity::find()
            .order_by_asc(attachments::Column::ParentKind)
            .order_by_asc(attachments::Column::ParentId)
            .order_by_asc(attachments::Column::OrderIndex)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;

        let rows = models
            .into_iter()
            .map(to_domain)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ordering::audit(rows))
    }
}

impl AttachmentLedger for AttachmentLedgerRepository {
    type Transaction = PgLedgerTransaction;

    async fn begin(&self) -> Result<PgLedgerTransaction, MediaError> {
        let txn = self
            .db
            .begin_with_config(Some(IsolationLevel::ReadCommitted), None)
            .await
            .map_err(map_db_err)?;

        Ok(PgLedgerTransaction { txn })
    }
}

/// One ledger transaction. Rolled back on drop unless committed.
#[derive(Debug)]
pub struct PgLedgerTransaction {
    txn: DatabaseTransaction,
}

impl LedgerTransaction for PgLedgerTransaction {
    async fn parent_exists(&mut self, parent: ParentRef) -> Result<bool, MediaError> {
        let count = match parent.kind {
            ParentKind::Pet => pets::Entity::find_by_id(parent.id).count(&self.txn).await,
            ParentKind::User => users::Entity::find_by_id(parent.id).count(&self.txn).await,
        }
        .map_err(map_db_err)?;

        Ok(count > 0)
    }

    async fn lock_parent(&mut self, parent: ParentRef) -> Result<bool, MediaError> {
        let found = match parent.kind {
            ParentKind::Pet => pets::Entity::find_by_id(parent.id)
                .lock_exclusive()
                .one(&self.txn)
                .await
                .map(|row| row.is_some()),
            ParentKind::User => users::Entity::find_by_id(parent.id)
                .lock_exclusive()
                .one(&self.txn)
                .await
                .map(|row| row.is_some()),
        }
        .map_err(map_db_err)?;

        Ok(found)
    }

    async fn create_parent(&mut self, parent: NewParent) -> Result<ParentRef, MediaError> {
        // The uncommitted row is invisible to other transactions until commit.
        insert_parent(&self.txn, parent).await.map_err(|err| {
            if sqlstate(&err).as_deref() == Some(UNIQUE_VIOLATION) {
                MediaError::DuplicateParent(err.to_string())
            } else {
                map_db_err(err)
            }
        })
    }

    async fn find(&mut self, id: AttachmentId) -> Result<Option<Attachment>, MediaError> {
        let model = attachments::Entity::find()
            .filter(attachments::Column::ExternalId.eq(id.into_inner()))
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;

        model.map(to_domain).transpose()
    }

    async fn siblings(&mut self, parent: ParentRef) -> Result<Vec<Attachment>, MediaError> {
        let models = attachments::Entity::find()
            .filter(attachments::Column::ParentKind.eq(parent.kind.as_str()))
            .filter(attachments::Column::ParentId.eq(parent.id))
            .order_by_asc(attachments::Column::OrderIndex)
            .order_by_asc(attachments::Column::Id)
            .all(&self.txn)
            .await
            .map_err(map_db_err)?;

        models.into_iter().map(to_domain).collect()
    }

    async fn insert(
        &mut self,
        meta: NewAttachment,
        order_index: u32,
    ) -> Result<Attachment, MediaError> {
        let now = Utc::now().into();

        let active_model = attachments::ActiveModel {
            external_id: Set(AttachmentId::new().into_inner()),
            parent_kind: Set(meta.parent.kind.as_str().to_string()),
            parent_id: Set(meta.parent.id),
            path: Set(meta.path),
            mime_type: Set(meta.mime_type),
            size: Set(meta.size),
            extension: Set(meta.extension),
            kind: Set(meta.kind),
            description: Set(meta.description),
            order_index: Set(to_db_index(order_index)?),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active_model.insert(&self.txn).await.map_err(map_db_err)?;

        to_domain(model)
    }

    async fn remove(&mut self, id: i64) -> Result<(), MediaError> {
        let result = attachments::Entity::delete_by_id(id)
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(MediaError::store(format!("attachment row {id} vanished")));
        }
        Ok(())
    }

    async fn reindex(&mut self, plan: &[Reindex]) -> Result<(), MediaError> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        for change in plan {
            attachments::Entity::update_many()
                .col_expr(
                    attachments::Column::OrderIndex,
                    Expr::value(to_db_index(change.to)?),
                )
                .col_expr(attachments::Column::UpdatedAt, Expr::value(now))
                .filter(attachments::Column::Id.eq(change.id))
                .exec(&self.txn)
                .await
                .map_err(map_db_err)?;
        }

        Ok(())
    }

    async fn remove_parent(&mut self, parent: ParentRef) -> Result<(), MediaError> {
        attachments::Entity::delete_many()
            .filter(attachments::Column::ParentKind.eq(parent.kind.as_str()))
            .filter(attachments::Column::ParentId.eq(parent.id))
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;

        match parent.kind {
            ParentKind::Pet => pets::Entity::delete_by_id(parent.id).exec(&self.txn).await,
            ParentKind::User => users::Entity::delete_by_id(parent.id).exec(&self.txn).await,
        }
        .map_err(map_db_err)?;

        Ok(())
    }

    async fn commit(self) -> Result<(), MediaError> {
        self.txn.commit().await.map_err(map_db_err)
    }
}

/// Convert a database row to a domain attachment.
fn to_domain(model: attachments::Model) -> Result<Attachment, MediaError> {
    let kind = ParentKind::parse(&model.parent_kind).ok_or_else(|| {
        MediaError::store(format!("unknown parent kind '{}'", model.parent_kind))
    })?;
    let order_index = u32::try_from(model.order_index)
        .map_err(|_| MediaError::store(format!("negative order index {}", model.order_index)))?;

    Ok(Attachment {
        id: model.id,
        external_id: AttachmentId::from_uuid(model.external_id),
        parent: ParentRef {
            kind,
            id: model.parent_id,
        },
        path: model.path,
        mime_type: model.mime_type,
        size: model.size,
        extension: model.extension,
        kind: model.kind,
        description: model.description,
        order_index,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn to_db_index(index: u32) -> Result<i32, MediaError> {
    i32::try_from(index).map_err(|_| MediaError::store(format!("order index {index} exceeds i32")))
}

/// Map a database error, flagging those a concurrent writer can cause.
fn map_db_err(err: DbErr) -> MediaError {
    if is_conflict(&err) {
        MediaError::conflict(err.to_string())
    } else {
        MediaError::store(err.to_string())
    }
}

fn is_conflict(err: &DbErr) -> bool {
    matches!(
        sqlstate(err).as_deref(),
        Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION)
    )
}

/// SQLSTATE reported by PostgreSQL, if the error came from the server.
fn sqlstate(err: &DbErr) -> Option<String> {
    let (DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime)) = err else {
        return None;
    };
    let RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) = runtime else {
        return None;
    };

    db_err.code().map(|code| code.into_owned())
}
