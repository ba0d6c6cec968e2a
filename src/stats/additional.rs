//! Secondary per-partition observability counters
//!
//! Same accept-then-drain discipline as live stats, keyed by metric name
//! instead of a single count/bytes pair.

use super::histogram::{read, write, PartitionHistogram};
use crate::types::{PartitionKey, StreamDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, RwLock};

/// One drained row: metric name to value
pub type MetricRow = BTreeMap<String, f64>;

/// An enumerated set of named metrics
pub trait AdditionalStat: Copy + Eq + Hash + Send + Sync + 'static {
    /// Every metric in the set
    fn all() -> &'static [Self];

    /// Name reported on the checkpoint
    fn metric_name(&self) -> &'static str;

    /// Value reported when nothing was recorded
    fn default_value(&self) -> f64 {
        0.0
    }
}

/// Value-level observability counters reported on checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObservabilityMetric {
    /// Values replaced with null because they could not be written
    NulledValueCount,
    /// Values shortened to fit the destination
    TruncatedValueCount,
    /// Bytes removed by truncation
    TruncatedByteCount,
}

impl ObservabilityMetric {
    const ALL: [Self; 3] = [
        Self::NulledValueCount,
        Self::TruncatedValueCount,
        Self::TruncatedByteCount,
    ];
}

impl AdditionalStat for ObservabilityMetric {
    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn metric_name(&self) -> &'static str {
        match self {
            Self::NulledValueCount => "nulledValueCount",
            Self::TruncatedValueCount => "truncatedValueCount",
            Self::TruncatedByteCount => "truncatedByteCount",
        }
    }
}

#[derive(Debug)]
struct StreamMetrics<M: AdditionalStat> {
    histograms: HashMap<M, PartitionHistogram>,
}

impl<M: AdditionalStat> StreamMetrics<M> {
    fn new() -> Self {
        Self {
            histograms: M::all()
                .iter()
                .map(|metric| (*metric, PartitionHistogram::new()))
                .collect(),
        }
    }

    fn drain(&self, partitions: &[PartitionKey]) -> MetricRow {
        M::all()
            .iter()
            .map(|metric| {
                let removed: Vec<f64> = self
                    .histograms
                    .get(metric)
                    .map(|histogram| {
                        partitions
                            .iter()
                            .filter_map(|partition| histogram.remove(partition))
                            .collect()
                    })
                    .unwrap_or_default();
                let value = if removed.is_empty() {
                    metric.default_value()
                } else {
                    removed.iter().sum()
                };
                (metric.metric_name().to_string(), value)
            })
            .collect()
    }
}

/// Per-stream, per-metric, per-partition counters
#[derive(Debug)]
pub struct StateAdditionalStatsStore<M: AdditionalStat = ObservabilityMetric> {
    streams: RwLock<HashMap<StreamDescriptor, Arc<StreamMetrics<M>>>>,
}

impl<M: AdditionalStat> Default for StateAdditionalStatsStore<M> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl<M: AdditionalStat> StateAdditionalStatsStore<M> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, stream: &StreamDescriptor) -> Arc<StreamMetrics<M>> {
        if let Some(metrics) = read(&self.streams).get(stream) {
            return Arc::clone(metrics);
        }
        let mut streams = write(&self.streams);
        Arc::clone(
            streams
                .entry(stream.clone())
                .or_insert_with(|| Arc::new(StreamMetrics::new())),
        )
    }

    /// Accumulate `value` into `metric` for one partition of one stream
    pub fn add(
        &self,
        partition: &PartitionKey,
        stream: &StreamDescriptor,
        metric: M,
        value: f64,
    ) {
        if let Some(histogram) = self.entry(stream).histograms.get(&metric) {
            histogram.increment(partition, value);
        }
    }

    /// Row with every metric at its default value
    pub fn default_row(&self) -> MetricRow {
        M::all()
            .iter()
            .map(|metric| (metric.metric_name().to_string(), metric.default_value()))
            .collect()
    }

    /// Drain the given partitions for every known stream
    ///
    /// Each row holds every metric of the set; metrics with nothing recorded
    /// report their default.
    pub fn drain(&self, partitions: &[PartitionKey]) -> HashMap<StreamDescriptor, MetricRow> {
        let streams: Vec<_> = read(&self.streams)
            .iter()
            .map(|(stream, metrics)| (stream.clone(), Arc::clone(metrics)))
            .collect();
        streams
            .into_iter()
            .map(|(stream, metrics)| (stream, metrics.drain(partitions)))
            .collect()
    }

    /// Drain the given partitions for a single stream
    pub fn drain_stream(
        &self,
        stream: &StreamDescriptor,
        partitions: &[PartitionKey],
    ) -> MetricRow {
        match read(&self.streams).get(stream).map(Arc::clone) {
            Some(metrics) => metrics.drain(partitions),
            None => StreamMetrics::<M>::new().drain(partitions),
        }
    }
}
