//! Backup core common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the bk-* crates:
//! - Correlation and operation identity types
//! - Config document schema versioning
//! - Common error types with stable codes

pub mod error;
pub mod id;
pub mod schema;

pub use error::{Error, Result};
pub use id::{CorrelationId, OperationId};
pub use schema::CONFIG_SCHEMA_VERSION;
