//! Checkpoint stats enrichment
//!
//! Commits live stats at checkpoint time and writes the results onto the
//! outgoing checkpoint message. Only the destination stats and the total
//! fields are written; the state payload and source stats are left alone.

use super::mapper::NamespaceMapper;
use super::types::{
    CheckpointMessage, CheckpointStats, CheckpointTotals, GlobalCheckpoint, StreamCheckpoint,
};
use crate::stats::{CommittedStatsStore, MetricRow, StateAdditionalStatsStore};
use crate::types::{CommitStatsResult, EmissionStats, StateKey, StreamDescriptor};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Commits stats for checkpoints and stamps them onto the messages
pub struct StateStatsEnricher {
    stats: Arc<CommittedStatsStore>,
    additional_stats: Option<Arc<StateAdditionalStatsStore>>,
    mapper: Arc<dyn NamespaceMapper>,
}

impl StateStatsEnricher {
    /// Create an enricher over `stats`, resolving streams with `mapper`
    pub fn new(stats: Arc<CommittedStatsStore>, mapper: impl NamespaceMapper + 'static) -> Self {
        Self {
            stats,
            additional_stats: None,
            mapper: Arc::new(mapper),
        }
    }

    /// Also drain named observability metrics onto destination stats
    #[must_use]
    pub fn with_additional_stats(mut self, store: Arc<StateAdditionalStatsStore>) -> Self {
        self.additional_stats = Some(store);
        self
    }

    /// The stats store commits are taken from
    pub fn stats(&self) -> &Arc<CommittedStatsStore> {
        &self.stats
    }

    /// Enrich a checkpoint of either scope
    pub fn enrich_message(
        &self,
        message: &mut CheckpointMessage,
        state_key: &StateKey,
    ) -> CommitStatsResult {
        match message {
            CheckpointMessage::Stream(checkpoint) => self.enrich_stream(checkpoint, state_key),
            CheckpointMessage::Global(checkpoint) => self.enrich_global(checkpoint, state_key),
        }
    }

    /// Commit the stream's partitions named by `state_key` and stamp the result
    pub fn enrich_stream(
        &self,
        checkpoint: &mut StreamCheckpoint,
        state_key: &StateKey,
    ) -> CommitStatsResult {
        let stream = self.mapper.map(
            checkpoint.unmapped_namespace.as_deref(),
            &checkpoint.unmapped_name,
        );
        let result = self.stats.commit_stats(&stream, state_key);

        self.enrich_top_level_destination_stats(checkpoint, result.committed_stats.count);
        if let Some(store) = &self.additional_stats {
            let row = store.drain_stream(&stream, &state_key.partition_keys);
            Self::set_additional_stats(checkpoint, row);
        }
        self.enrich_top_level_stats(checkpoint, result.cumulative_stats);

        debug!(
            stream = %stream,
            state_id = state_key.id,
            committed = result.committed_stats.count,
            total_records = result.cumulative_stats.count,
            "Enriched stream checkpoint"
        );
        result
    }

    /// Commit every sub-checkpoint's stream and stamp each one, plus the sum
    /// on the global checkpoint
    ///
    /// A global checkpoint without sub-checkpoints is still stamped, with zeros.
    pub fn enrich_global(
        &self,
        checkpoint: &mut GlobalCheckpoint,
        state_key: &StateKey,
    ) -> CommitStatsResult {
        let mut total = CommitStatsResult::default();
        let mut streams: BTreeSet<StreamDescriptor> = BTreeSet::new();

        for sub in &mut checkpoint.checkpoints {
            let stream = self
                .mapper
                .map(sub.unmapped_namespace.as_deref(), &sub.unmapped_name);
            let result = self.stats.commit_stats(&stream, state_key);
            sub.set_totals(result.cumulative_stats);
            total = total.merge(result);
            streams.insert(stream);
        }

        self.enrich_top_level_destination_stats(checkpoint, total.committed_stats.count);
        if let Some(store) = &self.additional_stats {
            let mut row = store.default_row();
            for stream in &streams {
                for (metric, value) in store.drain_stream(stream, &state_key.partition_keys) {
                    *row.entry(metric).or_default() += value;
                }
            }
            Self::set_additional_stats(checkpoint, row);
        }
        self.enrich_top_level_stats(checkpoint, total.cumulative_stats);

        debug!(
            state_id = state_key.id,
            streams = streams.len(),
            committed = total.committed_stats.count,
            total_records = total.cumulative_stats.count,
            "Enriched global checkpoint"
        );
        total
    }

    /// Overwrite the destination-observed record count
    pub fn enrich_top_level_destination_stats<C: CheckpointTotals>(
        &self,
        checkpoint: &mut C,
        record_count: i64,
    ) {
        checkpoint
            .destination_stats_mut()
            .get_or_insert_with(CheckpointStats::default)
            .record_count = record_count;
    }

    /// Overwrite the top-level totals
    pub fn enrich_top_level_stats<C: CheckpointTotals>(
        &self,
        checkpoint: &mut C,
        stats: EmissionStats,
    ) {
        checkpoint.set_totals(stats);
    }

    fn set_additional_stats<C: CheckpointTotals>(checkpoint: &mut C, row: MetricRow) {
        checkpoint
            .destination_stats_mut()
            .get_or_insert_with(CheckpointStats::default)
            .additional_stats = row;
    }
}
