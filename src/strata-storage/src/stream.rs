//! Partition stream utilities.
//!
//! Readers hand the engine a pull-based [`PartitionStream`]; the engine never
//! asks for more than it can process, so a lazy reader never materializes
//! more than the in-flight partitions.

use std::pin::Pin;

use common_error::StrataResult;
use futures::stream::Stream;
use strata_core::Partition;

/// A lazy stream of partitions.
pub type PartitionStream = Pin<Box<dyn Stream<Item = StrataResult<Partition>> + Send>>;

/// Create an empty `PartitionStream`.
pub fn empty_stream() -> PartitionStream {
    Box::pin(futures::stream::empty())
}

/// Create a `PartitionStream` from a vector of partitions.
pub fn vec_stream(partitions: Vec<Partition>) -> PartitionStream {
    Box::pin(futures::stream::iter(partitions.into_iter().map(Ok)))
}

/// Create a `PartitionStream` from a fallible iterator.
pub fn iter_stream<I>(iter: I) -> PartitionStream
where
    I: IntoIterator<Item = StrataResult<Partition>> + Send + 'static,
    I::IntoIter: Send,
{
    Box::pin(futures::stream::iter(iter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_error::StrataError;
    use futures::StreamExt;
    use strata_core::Record;

    #[tokio::test]
    async fn test_vec_stream() {
        let parts = vec![
            Partition::new(0, vec![Record::with_text("text", "a")]),
            Partition::new(1, vec![]),
        ];
        let collected: Vec<_> = vec_stream(parts.clone()).collect().await;
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].as_ref().unwrap(), &parts[0]);
    }

    #[tokio::test]
    async fn test_iter_stream_surfaces_errors() {
        let items = vec![Ok(Partition::default()), Err(StrataError::io("disk gone"))];
        let collected: Vec<_> = iter_stream(items).collect().await;
        assert!(collected[1].is_err());
        assert_eq!(empty_stream().count().await, 0);
    }
}
