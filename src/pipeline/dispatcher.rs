//! Record dispatcher
//!
//! Routes source records into the first step and records their live stats.

use super::step::StepQueue;
use super::types::{CheckpointCounts, PipelineEvent};
use crate::error::Result;
use crate::partition::{OutputPartitioner, WithStream};
use crate::stats::CommittedStatsStore;
use crate::types::{PartitionKey, StreamDescriptor};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

/// Entry point of the load pipeline
pub struct RecordDispatcher<K, T> {
    queue: StepQueue<K, T>,
    partitioner: Arc<dyn OutputPartitioner<K>>,
    stats: Arc<CommittedStatsStore>,
}

impl<K, T> RecordDispatcher<K, T>
where
    K: WithStream + Send + 'static,
    T: Send + 'static,
{
    /// Create a dispatcher feeding `queue`
    pub fn new(
        queue: StepQueue<K, T>,
        partitioner: impl OutputPartitioner<K> + 'static,
        stats: Arc<CommittedStatsStore>,
    ) -> Self {
        Self {
            queue,
            partitioner: Arc::new(partitioner),
            stats,
        }
    }

    /// The first step's input queue
    pub fn queue(&self) -> &StepQueue<K, T> {
        &self.queue
    }

    /// Route one record tagged with the checkpoint partition it belongs to
    ///
    /// Live stats are counted before the record is queued so a checkpoint
    /// can never observe the record's batch before its stats. A record that
    /// is not queued has its stats retracted. Returns `Ok(false)` if a
    /// best-effort queue dropped the record.
    pub async fn dispatch(
        &self,
        key: K,
        value: T,
        checkpoint_partition: PartitionKey,
        size_bytes: u64,
    ) -> Result<bool> {
        let partition = self.partitioner.partition(&key, self.queue.num_partitions());
        self.stats
            .accept_record(key.stream(), &checkpoint_partition, size_bytes);

        let stream = key.stream().clone();
        let counts = CheckpointCounts::from([(checkpoint_partition.clone(), 1)]);
        let queued = self
            .queue
            .enqueue(partition, PipelineEvent::message(key, value, counts))
            .await;

        if !matches!(queued, Ok(true)) {
            self.stats
                .retract_record(&stream, &checkpoint_partition, size_bytes);
            debug!(stream = %stream, partition, "Record not queued, retracted its live stats");
        }
        queued
    }

    /// Tell every partition that `stream` has no more records
    pub async fn end_of_stream(&self, stream: &StreamDescriptor) -> Result<()> {
        debug!(stream = %stream, "Dispatching end of stream");
        let sends = (0..self.queue.num_partitions()).map(|partition| {
            self.queue
                .enqueue(partition, PipelineEvent::end_of_stream(stream.clone()))
        });
        try_join_all(sends).await?;
        Ok(())
    }

    /// Close the first queue; the pipeline drains and shuts down behind it
    pub fn close(&self) {
        self.queue.close();
    }
}
