//! Pipeline types
//!
//! Events carried between steps, batch states, and step statistics.

use crate::types::{PartitionKey, StreamDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records per stats partition represented by a message or output
pub type CheckpointCounts = HashMap<PartitionKey, u64>;

/// Add `other` into `counts`
pub(crate) fn merge_counts(counts: &mut CheckpointCounts, other: CheckpointCounts) {
    for (key, count) in other {
        *counts.entry(key).or_default() += count;
    }
}

/// A keyed value flowing through a step
#[derive(Debug, Clone)]
pub struct PipelineMessage<K, T> {
    /// Accumulation key
    pub key: K,
    /// Payload
    pub value: T,
    /// Records per stats partition this message carries
    pub checkpoint_counts: CheckpointCounts,
}

/// An event on a step's input queue
#[derive(Debug, Clone)]
pub enum PipelineEvent<K, T> {
    /// A value to accumulate
    Message(PipelineMessage<K, T>),
    /// No more values for this stream will come from the sending worker
    EndOfStream {
        /// Stream that ended
        stream: StreamDescriptor,
    },
}

impl<K, T> PipelineEvent<K, T> {
    /// Create a message event
    pub fn message(key: K, value: T, checkpoint_counts: CheckpointCounts) -> Self {
        Self::Message(PipelineMessage {
            key,
            value,
            checkpoint_counts,
        })
    }

    /// Create an end-of-stream event
    pub fn end_of_stream(stream: StreamDescriptor) -> Self {
        Self::EndOfStream { stream }
    }
}

/// How far a batch has progressed towards the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    /// Transformed in memory
    Processed,
    /// Written to a staging area
    Staged,
    /// Loaded but not yet durable
    Loaded,
    /// Durable in the destination
    Persisted,
    /// Durable and finalized
    Complete,
}

impl BatchState {
    /// Whether records in this state may be acknowledged by a checkpoint
    pub fn is_terminal(self) -> bool {
        self >= Self::Persisted
    }
}

/// Outputs that report a batch state
pub trait WithBatchState {
    /// Current state of the batch this output describes
    fn batch_state(&self) -> BatchState;
}

/// Completion record sent when a step emits a terminal output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStateUpdate {
    /// Stream the batch belongs to
    pub stream: StreamDescriptor,
    /// Records per stats partition the batch covers
    pub checkpoint_counts: CheckpointCounts,
    /// Terminal state reached
    pub state: BatchState,
    /// Step that emitted the batch
    pub step: String,
}

/// Live counters of one step
#[derive(Debug, Default)]
pub(crate) struct StepCounters {
    pub(crate) messages_accepted: AtomicU64,
    pub(crate) outputs_emitted: AtomicU64,
    pub(crate) batches_completed: AtomicU64,
}

impl StepCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Statistics from one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    /// Step name
    pub name: String,
    /// Workers the step ran
    pub workers: usize,
    /// Messages folded into accumulators
    pub messages_accepted: u64,
    /// Intermediate and final outputs emitted
    pub outputs_emitted: u64,
    /// Outputs that reached a terminal batch state
    pub batches_completed: u64,
}

impl StepSummary {
    pub(crate) fn from_counters(name: &str, workers: usize, counters: &StepCounters) -> Self {
        Self {
            name: name.to_string(),
            workers,
            messages_accepted: counters.messages_accepted.load(Ordering::Relaxed),
            outputs_emitted: counters.outputs_emitted.load(Ordering::Relaxed),
            batches_completed: counters.batches_completed.load(Ordering::Relaxed),
        }
    }
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    /// Per-step statistics, in step order
    pub steps: Vec<StepSummary>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl PipelineSummary {
    /// Find a step's statistics by name
    pub fn step(&self, name: &str) -> Option<&StepSummary> {
        self.steps.iter().find(|step| step.name == name)
    }
}
