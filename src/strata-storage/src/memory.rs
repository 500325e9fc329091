//! In-memory readers and writers.
//!
//! Used for tests and for embedding pipelines in other programs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use common_error::{StrataError, StrataResult};
use strata_core::{Partition, Record, SourceSchema};
use strata_logical::{ParamSchema, ParamSpec, ParamType, Params};

use crate::stream::{iter_stream, PartitionStream};
use crate::traits::{Reader, Writer};

// ============================================================================
// MemoryReader
// ============================================================================

/// Reader over partitions held in memory.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    partitions: Arc<Vec<Partition>>,
    schema: SourceSchema,
    fail_at: Option<usize>,
}

impl MemoryReader {
    /// Create a reader with an open schema over `text`.
    pub fn new(partitions: Vec<Partition>) -> Self {
        Self {
            partitions: Arc::new(partitions),
            schema: SourceSchema::default(),
            fail_at: None,
        }
    }

    /// Split records into partitions of `size`.
    pub fn from_records(records: Vec<Record>, size: usize) -> Self {
        Self::new(Partition::chunk(records, size))
    }

    /// Declare the schema of the records.
    #[must_use]
    pub fn with_schema(mut self, schema: SourceSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Yield an `IOError` in place of the partition at `index`.
    #[must_use]
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }
}

#[async_trait]
impl Reader for MemoryReader {
    fn name(&self) -> &str {
        "memory"
    }

    fn schema(&self) -> SourceSchema {
        self.schema.clone()
    }

    async fn partitions(&self) -> StrataResult<PartitionStream> {
        let fail_at = self.fail_at;
        let items: Vec<StrataResult<Partition>> = self
            .partitions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if Some(i) == fail_at {
                    Err(StrataError::io(format!("memory reader failed at partition {i}")))
                } else {
                    Ok(p.clone())
                }
            })
            .collect();
        Ok(iter_stream(items))
    }
}

// ============================================================================
// MemoryWriter
// ============================================================================

/// Lifecycle of a memory sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkState {
    #[default]
    Open,
    Committed,
    Aborted,
}

#[derive(Debug, Default)]
struct SinkInner {
    staged: Vec<Partition>,
    committed: Vec<Partition>,
    summary: Vec<Record>,
    state: SinkState,
}

/// Shared handle onto what a [`MemoryWriter`] has committed.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<SinkInner>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Committed partitions in write order.
    pub fn partitions(&self) -> Vec<Partition> {
        self.lock().committed.clone()
    }

    /// Committed records, flattened in write order.
    pub fn records(&self) -> Vec<Record> {
        self.lock()
            .committed
            .iter()
            .flat_map(|p| p.records().iter().cloned())
            .collect()
    }

    /// Committed summary records.
    pub fn summary(&self) -> Vec<Record> {
        let inner = self.lock();
        if inner.state == SinkState::Committed {
            inner.summary.clone()
        } else {
            Vec::new()
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SinkState {
        self.lock().state
    }

    /// Writer staging into this sink.
    pub fn writer(&self) -> MemoryWriter {
        MemoryWriter { sink: self.clone() }
    }
}

/// Writer that stages into a [`MemorySink`].
#[derive(Debug, Clone)]
pub struct MemoryWriter {
    sink: MemorySink,
}

impl MemoryWriter {
    /// Create a writer and the sink it commits to.
    pub fn new() -> (Self, MemorySink) {
        let sink = MemorySink::new();
        (sink.writer(), sink)
    }
}

#[async_trait]
impl Writer for MemoryWriter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write_partition(&self, partition: Partition) -> StrataResult<()> {
        let mut inner = self.sink.lock();
        if inner.state != SinkState::Open {
            return Err(StrataError::io(format!(
                "memory sink is {:?}; cannot write",
                inner.state
            )));
        }
        inner.staged.push(partition);
        Ok(())
    }

    async fn write_summary(&self, records: Vec<Record>) -> StrataResult<()> {
        self.sink.lock().summary = records;
        Ok(())
    }

    async fn commit(&self) -> StrataResult<()> {
        let mut inner = self.sink.lock();
        let staged = std::mem::take(&mut inner.staged);
        inner.committed.extend(staged);
        inner.state = SinkState::Committed;
        Ok(())
    }

    async fn abort(&self) -> StrataResult<()> {
        let mut inner = self.sink.lock();
        inner.staged.clear();
        inner.summary.clear();
        inner.state = SinkState::Aborted;
        Ok(())
    }
}

// ============================================================================
// NullWriter
// ============================================================================

/// Writer that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NullWriter;

impl NullWriter {
    /// Declared parameters (none).
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new().param(
            ParamSpec::new("path", ParamType::String).describe("Ignored; accepted for symmetry"),
        )
    }

    /// Build from validated parameters.
    pub fn from_params(_params: &Params) -> StrataResult<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl Writer for NullWriter {
    fn name(&self) -> &str {
        "null"
    }

    async fn write_partition(&self, _partition: Partition) -> StrataResult<()> {
        Ok(())
    }

    async fn commit(&self) -> StrataResult<()> {
        Ok(())
    }

    async fn abort(&self) -> StrataResult<()> {
        Ok(())
    }
}
