//! Core media logic for Adopet.
//!
//! This crate contains the attachment ordering engine with ZERO web or
//! database dependencies. Persistence is reached through the ledger traits
//! in [`media::ledger`]; bytes go through [`storage::BlobStore`].
//!
//! # Modules
//!
//! - `media` - Attachment ordering, the last-attachment guard and the media service
//! - `storage` - Blob storage via Apache OpenDAL

pub mod media;
pub mod storage;
