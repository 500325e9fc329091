//! Readers and writers for Strata pipelines.
//!
//! A [`Reader`] turns a source into a lazy stream of partitions; a
//! [`Writer`] stages surviving records and the aggregation summary and makes
//! them visible on commit.

pub mod delimited;
pub mod jsonl;
pub(crate) mod lines;
pub mod memory;
pub(crate) mod staged;
pub mod stream;
pub mod text;
pub mod traits;

pub use delimited::{CsvReader, CsvWriter};
pub use jsonl::{JsonlReader, JsonlWriter};
pub use memory::{MemoryReader, MemorySink, MemoryWriter, NullWriter, SinkState};
pub use stream::{empty_stream, iter_stream, vec_stream, PartitionStream};
pub use text::TextReader;
pub use traits::{Reader, Writer};
