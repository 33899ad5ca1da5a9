//! `SeaORM` entity definitions.
//!
//! Attachments reference their parent through `(parent_kind, parent_id)`
//! rather than a foreign key, so no relations are declared.

pub mod attachments;
pub mod pets;
pub mod users;
