//! Reader and writer contracts.

use std::fmt::Debug;

use async_trait::async_trait;

use common_error::StrataResult;
use strata_core::{Partition, Record, SourceSchema};

use crate::stream::PartitionStream;

/// Produces partitions of records from a named source.
///
/// Construction must not touch the source; all I/O happens in
/// [`Reader::partitions`], which may be called once per run.
#[async_trait]
pub trait Reader: Send + Sync + Debug {
    /// Registered format name.
    fn name(&self) -> &str;

    /// Fields every produced record is guaranteed to carry.
    fn schema(&self) -> SourceSchema;

    /// Open the source and return a lazy partition stream.
    ///
    /// Failures surface as `IOError`, either here or as stream items.
    async fn partitions(&self) -> StrataResult<PartitionStream>;
}

/// Consumes the surviving records and the aggregation summary.
///
/// Writes are staged: nothing is visible at the sink until
/// [`Writer::commit`]; [`Writer::abort`] discards staged output.
#[async_trait]
pub trait Writer: Send + Sync + Debug {
    /// Registered format name.
    fn name(&self) -> &str;

    /// Stage one partition of surviving records.
    async fn write_partition(&self, partition: Partition) -> StrataResult<()>;

    /// Stage the finalized aggregation summary records.
    async fn write_summary(&self, _records: Vec<Record>) -> StrataResult<()> {
        Ok(())
    }

    /// Make staged output visible.
    async fn commit(&self) -> StrataResult<()>;

    /// Discard staged output.
    async fn abort(&self) -> StrataResult<()>;
}
