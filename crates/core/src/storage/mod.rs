//! Blob storage for attachment files using Apache OpenDAL.
//!
//! This module provides vendor-agnostic object storage with support for:
//! - S3-compatible: AWS S3, Cloudflare R2, Supabase Storage, DigitalOcean Spaces
//! - Local filesystem (development only)
//! - Process memory (tests only)
//!
//! The media engine never talks to OpenDAL directly; it only sees the
//! [`BlobStore`] trait.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Apache OpenDAL                        │
//! ├──────────────────────────────────────────────────────────┤
//! │ op.write_with(key, data)   │ op.stat(key)                │
//! │ op.delete(key)             │                             │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod blob;
mod config;
mod error;
mod service;

pub use blob::{BlobStore, BlobUpload, StoredBlob};
pub use config::{StorageConfig, StorageProvider};
pub use error::StorageError;
pub use service::StorageService;
