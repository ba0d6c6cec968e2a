//! Checkpoint ledger
//!
//! Tracks, per stream and checkpoint partition, how many records were
//! dispatched and how many the pipeline reported durable. A checkpoint may
//! be released once every partition it names is fully persisted.

use crate::pipeline::BatchStateUpdate;
use crate::types::{PartitionKey, StreamDescriptor};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    dispatched: u64,
    persisted: u64,
}

/// Dispatched vs. persisted record counts
#[derive(Debug, Default)]
pub struct CheckpointLedger {
    entries: Mutex<HashMap<(StreamDescriptor, PartitionKey), Progress>>,
}

impl CheckpointLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        stream: &StreamDescriptor,
        partition: &PartitionKey,
        f: impl FnOnce(&mut Progress) -> T,
    ) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(entries
            .entry((stream.clone(), partition.clone()))
            .or_default())
    }

    /// Record `count` more records sent into the pipeline
    pub fn record_dispatched(&self, stream: &StreamDescriptor, partition: &PartitionKey, count: u64) {
        self.with_entry(stream, partition, |progress| progress.dispatched += count);
    }

    /// Take back `count` records that were counted but never entered the pipeline
    pub fn record_dropped(&self, stream: &StreamDescriptor, partition: &PartitionKey, count: u64) {
        self.with_entry(stream, partition, |progress| {
            progress.dispatched = progress.dispatched.saturating_sub(count);
        });
    }

    /// Apply a batch completion; non-terminal states are ignored
    pub fn apply(&self, update: &BatchStateUpdate) {
        if !update.state.is_terminal() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (partition, count) in &update.checkpoint_counts {
            entries
                .entry((update.stream.clone(), partition.clone()))
                .or_default()
                .persisted += count;
        }
    }

    /// Records dispatched but not yet persisted
    pub fn pending(&self, stream: &StreamDescriptor, partition: &PartitionKey) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(stream.clone(), partition.clone()))
            .map_or(0, |progress| {
                progress.dispatched.saturating_sub(progress.persisted)
            })
    }

    /// Whether every dispatched record of the partition is persisted
    pub fn is_persisted(&self, stream: &StreamDescriptor, partition: &PartitionKey) -> bool {
        self.pending(stream, partition) == 0
    }

    /// Whether every named partition is persisted
    pub fn all_persisted(&self, stream: &StreamDescriptor, partitions: &[PartitionKey]) -> bool {
        partitions
            .iter()
            .all(|partition| self.is_persisted(stream, partition))
    }

    /// Drop the entry of a released checkpoint partition
    pub fn forget(&self, stream: &StreamDescriptor, partition: &PartitionKey) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(stream.clone(), partition.clone()));
    }

    /// Number of tracked (stream, partition) entries
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no entries are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
