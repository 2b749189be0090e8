//! Relay Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all Relay components:
//! - Error taxonomy
//! - Subject naming helpers
//! - Identifier generation and name validation

pub mod error;
pub mod subject;
pub mod utils;

// Re-exports for convenience
pub use error::{RelayError, Result};
pub use subject::{INBOX_PREFIX, STORAGE_SEGMENT, rpc_subject, storage_prefix, storage_subject};
pub use utils::{generate_id, is_valid_token};

/// Field every stored record carries its identifier in
pub const ID_FIELD: &str = "_id";

/// Context slot names that cannot be used as method names
pub const RESERVED_NAMES: [&str; 3] = ["$call", "$data", "$storage"];
