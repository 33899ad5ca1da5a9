//! Shared configuration, errors, and typed identifiers for Adopet.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for externally exposed entity references
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, StorageSettings};
pub use error::AppError;
