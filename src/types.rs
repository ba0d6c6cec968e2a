//! Common types used throughout Solidafy Load
//!
//! This module contains the identifiers and value types shared by the
//! pipeline, the stats stores and the checkpoint enricher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

// ============================================================================
// Stream Descriptor
// ============================================================================

/// Canonical (mapped) identity of a destination stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Namespace (schema, dataset, ...) if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Stream name
    pub name: String,
}

impl StreamDescriptor {
    /// Create a descriptor with a namespace
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(ToString::to_string),
            name: name.into(),
        }
    }

    /// Create a descriptor without a namespace
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

// ============================================================================
// Partition Key
// ============================================================================

/// Opaque identifier of a stats partition (e.g. a shard or checkpoint label)
///
/// Only identity matters; there is no ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    /// Create a new partition key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// State Key
// ============================================================================

/// Identifies one checkpoint emission and the partitions it claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateKey {
    /// Monotonically increasing checkpoint id
    pub id: u64,
    /// Partitions whose buffered contribution this checkpoint commits
    #[serde(default)]
    pub partition_keys: Vec<PartitionKey>,
}

impl StateKey {
    /// Create a new state key
    pub fn new(id: u64, partition_keys: Vec<PartitionKey>) -> Self {
        Self { id, partition_keys }
    }

    /// Whether this checkpoint claims no partitions
    pub fn is_empty(&self) -> bool {
        self.partition_keys.is_empty()
    }
}

// ============================================================================
// Emission Stats
// ============================================================================

/// Immutable record/byte count pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmissionStats {
    /// Number of records
    pub count: i64,
    /// Number of bytes
    pub bytes: i64,
}

impl EmissionStats {
    /// Create new stats
    pub const fn new(count: i64, bytes: i64) -> Self {
        Self { count, bytes }
    }

    /// All-zero stats
    pub const fn zero() -> Self {
        Self { count: 0, bytes: 0 }
    }

    /// Whether both fields are zero
    pub fn is_zero(&self) -> bool {
        self.count == 0 && self.bytes == 0
    }
}

impl Add for EmissionStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            count: self.count + rhs.count,
            bytes: self.bytes + rhs.bytes,
        }
    }
}

impl AddAssign for EmissionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.count += rhs.count;
        self.bytes += rhs.bytes;
    }
}

impl std::iter::Sum for EmissionStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

// ============================================================================
// Commit Result
// ============================================================================

/// Result of committing live stats at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitStatsResult {
    /// Stats claimed by this checkpoint
    pub committed_stats: EmissionStats,
    /// Running total for the stream after this commit
    pub cumulative_stats: EmissionStats,
}

impl CommitStatsResult {
    /// Create a new commit result
    pub const fn new(committed_stats: EmissionStats, cumulative_stats: EmissionStats) -> Self {
        Self {
            committed_stats,
            cumulative_stats,
        }
    }

    /// Field-wise sum, used when one checkpoint spans several streams
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            committed_stats: self.committed_stats + other.committed_stats,
            cumulative_stats: self.cumulative_stats + other.cumulative_stats,
        }
    }
}

// ============================================================================
// Log Level
// ============================================================================

/// Log level for the pipeline binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_descriptor_display() {
        assert_eq!(
            StreamDescriptor::new(Some("public"), "users").to_string(),
            "public.users"
        );
        assert_eq!(StreamDescriptor::named("users").to_string(), "users");
    }

    #[test]
    fn test_emission_stats_add() {
        let a = EmissionStats::new(10, 100);
        let b = EmissionStats::new(5, 50);
        assert_eq!(a + b, EmissionStats::new(15, 150));

        let mut c = EmissionStats::zero();
        c += a;
        assert_eq!(c, a);

        let total: EmissionStats = vec![a, b, a].into_iter().sum();
        assert_eq!(total, EmissionStats::new(25, 250));
        assert!(EmissionStats::default().is_zero());
    }

    #[test]
    fn test_commit_result_merge() {
        let a = CommitStatsResult::new(EmissionStats::new(1, 10), EmissionStats::new(3, 30));
        let b = CommitStatsResult::new(EmissionStats::new(2, 20), EmissionStats::new(4, 40));
        assert_eq!(
            a.merge(b),
            CommitStatsResult::new(EmissionStats::new(3, 30), EmissionStats::new(7, 70))
        );
    }

    #[test]
    fn test_partition_key_serde_is_transparent() {
        let key = PartitionKey::from("p1");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"p1\"");
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::DEBUG, tracing::Level::from(LogLevel::Debug));
        assert_eq!(LogLevel::default(), LogLevel::Info);
        let level: LogLevel = serde_json::from_str("\"WARN\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
    }
}
