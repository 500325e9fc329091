//! Pipeline execution.
//!
//! - [`ExecutionContext`]: read-only context shared by partition workers
//! - [`LocalExecutor`]: bounded worker pool over the partitions of one run
//! - [`RunSummary`]: counters, aggregation results and reported errors

mod context;
mod local;
mod result;

pub use context::{CancellationHandle, ExecutionContext, RuntimeConfig};
pub use local::LocalExecutor;
pub use result::{AggregationResult, RunSummary};
