//! Checkpoint message types
//!
//! These are the checkpoint messages the destination acknowledges back to
//! the platform. Field names follow the platform's camelCase wire format.

use crate::stats::MetricRow;
use crate::types::{EmissionStats, JsonValue};
use serde::{Deserialize, Serialize};

/// Record count plus optional named metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointStats {
    /// Records covered by the checkpoint
    pub record_count: i64,

    /// Named observability metrics
    #[serde(default, skip_serializing_if = "MetricRow::is_empty")]
    pub additional_stats: MetricRow,
}

impl CheckpointStats {
    /// Stats with only a record count
    pub fn records(record_count: i64) -> Self {
        Self {
            record_count,
            additional_stats: MetricRow::new(),
        }
    }
}

/// Per-stream entry of a global checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Source namespace, before mapping
    #[serde(default)]
    pub unmapped_namespace: Option<String>,

    /// Source stream name, before mapping
    pub unmapped_name: String,

    /// Opaque source state
    #[serde(default)]
    pub state: JsonValue,

    /// Records committed for this stream since the sync began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<i64>,

    /// Bytes committed for this stream since the sync began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<i64>,
}

impl Checkpoint {
    /// Create a sub-checkpoint for a source stream
    pub fn new(namespace: Option<&str>, name: impl Into<String>, state: JsonValue) -> Self {
        Self {
            unmapped_namespace: namespace.map(str::to_string),
            unmapped_name: name.into(),
            state,
            total_records: None,
            total_bytes: None,
        }
    }

    /// Overwrite the cumulative totals
    pub fn set_totals(&mut self, stats: EmissionStats) {
        self.total_records = Some(stats.count);
        self.total_bytes = Some(stats.bytes);
    }
}

/// Checkpoint scoped to one stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCheckpoint {
    /// Source namespace, before mapping
    #[serde(default)]
    pub unmapped_namespace: Option<String>,

    /// Source stream name, before mapping
    pub unmapped_name: String,

    /// Opaque source state
    #[serde(default)]
    pub state: JsonValue,

    /// Stats reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_stats: Option<CheckpointStats>,

    /// Stats observed by the destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_stats: Option<CheckpointStats>,

    /// Records committed since the sync began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<i64>,

    /// Bytes committed since the sync began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<i64>,
}

impl StreamCheckpoint {
    /// Create a stream checkpoint carrying the source's record count
    pub fn new(
        namespace: Option<&str>,
        name: impl Into<String>,
        state: JsonValue,
        source_record_count: i64,
    ) -> Self {
        Self {
            unmapped_namespace: namespace.map(str::to_string),
            unmapped_name: name.into(),
            state,
            source_stats: Some(CheckpointStats::records(source_record_count)),
            ..Self::default()
        }
    }
}

/// Checkpoint spanning several streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalCheckpoint {
    /// State shared by every stream
    #[serde(default)]
    pub shared_state: JsonValue,

    /// Per-stream entries
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,

    /// Stats reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_stats: Option<CheckpointStats>,

    /// Stats observed by the destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_stats: Option<CheckpointStats>,

    /// Records committed across all streams since the sync began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<i64>,

    /// Bytes committed across all streams since the sync began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<i64>,
}

/// A checkpoint message of either scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum CheckpointMessage {
    /// One stream
    Stream(StreamCheckpoint),
    /// Several streams at once
    Global(GlobalCheckpoint),
}

impl CheckpointMessage {
    /// Serialize as one JSON line
    pub fn to_json_line(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Top-level fields the enricher writes on a checkpoint
pub trait CheckpointTotals {
    /// Destination-observed stats
    fn destination_stats_mut(&mut self) -> &mut Option<CheckpointStats>;

    /// Overwrite the cumulative totals
    fn set_totals(&mut self, stats: EmissionStats);
}

impl CheckpointTotals for StreamCheckpoint {
    fn destination_stats_mut(&mut self) -> &mut Option<CheckpointStats> {
        &mut self.destination_stats
    }

    fn set_totals(&mut self, stats: EmissionStats) {
        self.total_records = Some(stats.count);
        self.total_bytes = Some(stats.bytes);
    }
}

impl CheckpointTotals for GlobalCheckpoint {
    fn destination_stats_mut(&mut self) -> &mut Option<CheckpointStats> {
        &mut self.destination_stats
    }

    fn set_totals(&mut self, stats: EmissionStats) {
        self.total_records = Some(stats.count);
        self.total_bytes = Some(stats.bytes);
    }
}
