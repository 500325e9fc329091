//! Partitions: independently processable shards of records.

use common_error::RecordLocator;

use crate::record::Record;

/// An ordered, finite sequence of records.
///
/// Partitions are the unit of parallelism and of aggregation-merge
/// granularity. `index` is the partition's position in reader order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    index: usize,
    records: Vec<Record>,
}

impl Partition {
    /// Create a partition.
    pub fn new(index: usize, records: Vec<Record>) -> Self {
        Self { index, records }
    }

    /// Position in reader order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Re-number the partition.
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Records in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consume the partition.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the partition has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stamp every record with its locator inside this partition.
    #[must_use]
    pub fn with_lineage(self) -> Self {
        let index = self.index;
        let records = self
            .records
            .into_iter()
            .enumerate()
            .map(|(offset, record)| {
                record.with_origin(Some(RecordLocator::new(index, offset)))
            })
            .collect();
        Self { index, records }
    }

    /// Split records into partitions of at most `size` records.
    pub fn chunk(records: Vec<Record>, size: usize) -> Vec<Partition> {
        let size = size.max(1);
        let mut partitions = Vec::with_capacity(records.len().div_ceil(size));
        let mut current = Vec::with_capacity(size.min(records.len()));
        for record in records {
            current.push(record);
            if current.len() == size {
                let index = partitions.len();
                partitions.push(Self::new(index, std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            let index = partitions.len();
            partitions.push(Self::new(index, current));
        }
        partitions
    }
}

impl IntoIterator for Partition {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
