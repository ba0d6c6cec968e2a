//! Live / committed / cumulative stats per stream
//!
//! Producers call [`CommittedStatsStore::accept_stats`] as records reach a
//! partition. When a checkpoint is cut, [`CommittedStatsStore::commit_stats`]
//! moves the named partitions out of the live table and into the stream's
//! cumulative total.

use super::histogram::{read, write, PartitionHistogram, PartitionStats};
use crate::types::{CommitStatsResult, EmissionStats, PartitionKey, StateKey, StreamDescriptor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// Reconciles records seen by partitions against records committed at checkpoints
///
/// One store lives for one sync; nothing is persisted.
#[derive(Debug, Default)]
pub struct CommittedStatsStore {
    /// Per-stream live stats, created lazily and never removed
    live: RwLock<HashMap<StreamDescriptor, Arc<PartitionStats>>>,
    /// Per-stream running total of everything committed so far
    cumulative: Mutex<HashMap<StreamDescriptor, EmissionStats>>,
}

impl CommittedStatsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry(&self, stream: &StreamDescriptor) -> Arc<PartitionStats> {
        if let Some(stats) = read(&self.live).get(stream) {
            return Arc::clone(stats);
        }
        let mut live = write(&self.live);
        Arc::clone(live.entry(stream.clone()).or_default())
    }

    fn existing_entry(&self, stream: &StreamDescriptor) -> Option<Arc<PartitionStats>> {
        read(&self.live).get(stream).map(Arc::clone)
    }

    /// Merge per-partition counts and bytes into the stream's live stats
    pub fn accept_stats(
        &self,
        stream: &StreamDescriptor,
        counts: &PartitionHistogram,
        bytes: &PartitionHistogram,
    ) {
        self.live_entry(stream).accept(counts, bytes);
    }

    /// Account one record of `bytes` bytes to `partition`
    pub fn accept_record(&self, stream: &StreamDescriptor, partition: &PartitionKey, bytes: u64) {
        self.live_entry(stream).increment(partition, 1.0, bytes as f64);
    }

    /// Undo an `accept_record` for a record that never entered the pipeline
    pub fn retract_record(&self, stream: &StreamDescriptor, partition: &PartitionKey, bytes: u64) {
        if let Some(stats) = self.existing_entry(stream) {
            stats.increment(partition, -1.0, -(bytes as f64));
        }
    }

    /// Remove one partition's live stats, returning them (zero if absent)
    pub fn remove_live_stats(
        &self,
        stream: &StreamDescriptor,
        partition: &PartitionKey,
    ) -> EmissionStats {
        self.existing_entry(stream)
            .map_or(EmissionStats::zero(), |stats| stats.remove(partition))
    }

    /// Remove every partition named by `state_key`, returning their sum
    pub fn remove_live_stats_for(
        &self,
        stream: &StreamDescriptor,
        state_key: &StateKey,
    ) -> EmissionStats {
        let Some(stats) = self.existing_entry(stream) else {
            return EmissionStats::zero();
        };
        state_key
            .partition_keys
            .iter()
            .map(|partition| stats.remove(partition))
            .sum()
    }

    /// Commit the live stats of the partitions named by `state_key`
    ///
    /// Precondition: the checkpoint protocol only names a partition once its
    /// pre-checkpoint records have stopped flowing. Increments that still race
    /// with the commit are counted wholly in this commit or wholly in the next
    /// one, never split or lost.
    ///
    /// An empty partition list yields an all-zero result without touching the
    /// store.
    pub fn commit_stats(
        &self,
        stream: &StreamDescriptor,
        state_key: &StateKey,
    ) -> CommitStatsResult {
        if state_key.is_empty() {
            return CommitStatsResult::default();
        }

        let committed = self.remove_live_stats_for(stream, state_key);
        let cumulative = {
            let mut totals = self
                .cumulative
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let total = totals.entry(stream.clone()).or_default();
            *total += committed;
            *total
        };

        debug!(
            stream = %stream,
            state_id = state_key.id,
            committed_count = committed.count,
            committed_bytes = committed.bytes,
            cumulative_count = cumulative.count,
            "Committed stats"
        );

        CommitStatsResult::new(committed, cumulative)
    }

    /// Sum of a stream's live stats across partitions
    pub fn live_stats(&self, stream: &StreamDescriptor) -> EmissionStats {
        self.existing_entry(stream)
            .map_or(EmissionStats::zero(), |stats| stats.total())
    }

    /// Live stats of one partition, without removing them
    pub fn live_partition_stats(
        &self,
        stream: &StreamDescriptor,
        partition: &PartitionKey,
    ) -> EmissionStats {
        self.existing_entry(stream)
            .map_or(EmissionStats::zero(), |stats| stats.get(partition))
    }

    /// Running total committed for a stream
    pub fn cumulative_stats(&self, stream: &StreamDescriptor) -> EmissionStats {
        self.cumulative
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .copied()
            .unwrap_or_default()
    }

    /// Streams that have received at least one `accept_stats`
    pub fn streams(&self) -> Vec<StreamDescriptor> {
        read(&self.live).keys().cloned().collect()
    }
}
