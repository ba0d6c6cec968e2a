//! Checkpoint statistics module
//!
//! Tracks, per destination stream and per partition, how many records and
//! bytes are buffered ("live"), how many a checkpoint commits, and how many
//! have been committed since the sync began ("cumulative").
//!
//! # Overview
//!
//! The stats module provides:
//! - `PartitionHistogram` - per-partition atomic accumulator
//! - `PartitionStats` - paired count/bytes histograms
//! - `CommittedStatsStore` - live → committed → cumulative bookkeeping
//! - `StateAdditionalStatsStore` - named observability counters drained per checkpoint

mod additional;
mod committed;
mod histogram;

pub use additional::{AdditionalStat, MetricRow, ObservabilityMetric, StateAdditionalStatsStore};
pub use committed::CommittedStatsStore;
pub use histogram::{PartitionHistogram, PartitionStats};

#[cfg(test)]
mod tests;
