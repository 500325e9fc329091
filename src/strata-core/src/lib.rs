//! Core data model for Strata.
//!
//! This crate provides the fundamental types every pipeline stage sees:
//! - `Value` for typed field values
//! - `Record` for one document plus the metadata added by earlier stages
//! - `Partition` for an independently processable shard of records

pub mod partition;
pub mod record;
pub mod schema;
pub mod types;

// Re-export commonly used types
pub use common_error::RecordLocator;
pub use partition::Partition;
pub use record::{FieldPath, Record};
pub use schema::SourceSchema;
pub use types::{DataType, Value};
