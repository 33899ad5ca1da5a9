//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod attachment;
pub mod parent;

pub use attachment::{AttachmentLedgerRepository, PgLedgerTransaction};
pub use parent::ParentRepository;
