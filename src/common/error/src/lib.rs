//! Error types and result aliases for Strata.
//!
//! Every failure a pipeline can raise, from a malformed description to a
//! corrupted aggregation merge, is a variant of [`StrataError`].

mod error;

pub use error::{RecordLocator, StrataError, StrataResult};
