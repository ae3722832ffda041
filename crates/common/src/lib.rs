#![deny(missing_docs)]

//! Shared configuration, error types, and IDs for Quill crates.
//!
//! Architecture role:
//! - provides the common [`QuillError`] / [`Result`] contracts
//! - hosts the attribute/relation identity generators used by resolution
//! - defines compiler configuration passed across layers
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]

/// Compiler configuration types.
pub mod config;
/// Shared error taxonomy.
pub mod error;
/// Strongly-typed identifier wrappers.
pub mod ids;

pub use config::CompilerConfig;
pub use error::{QuillError, Result};
pub use ids::*;
