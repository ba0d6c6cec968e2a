//! Partitioner traits

use crate::types::StreamDescriptor;

/// Keys that belong to a destination stream
pub trait WithStream {
    /// The stream this key belongs to
    fn stream(&self) -> &StreamDescriptor;
}

impl WithStream for StreamDescriptor {
    fn stream(&self) -> &StreamDescriptor {
        self
    }
}

/// Chooses the queue partition for an event key
pub trait OutputPartitioner<K>: Send + Sync {
    /// Partition index in `0..num_partitions`
    fn partition(&self, key: &K, num_partitions: usize) -> usize;
}

impl<K, F> OutputPartitioner<K> for F
where
    F: Fn(&K, usize) -> usize + Send + Sync,
{
    fn partition(&self, key: &K, num_partitions: usize) -> usize {
        self(key, num_partitions)
    }
}
