//! Loader types

use crate::pipeline::{BatchState, WithBatchState};
use crate::types::StreamDescriptor;
use serde::Serialize;

/// A record handed to the sink, with its serialized size
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord<R> {
    /// Record payload
    pub data: R,
    /// Bytes the record occupies in the sink's wire format
    pub size_bytes: u64,
}

impl<R> LoadRecord<R> {
    /// Create a record of `size_bytes` bytes
    pub fn new(data: R, size_bytes: u64) -> Self {
        Self { data, size_bytes }
    }
}

impl LoadRecord<serde_json::Value> {
    /// Wrap a JSON value, sized by its compact serialization
    pub fn json(data: serde_json::Value) -> Self {
        let size_bytes = data.to_string().len() as u64;
        Self { data, size_bytes }
    }
}

/// Per-key buffer of a `SinkBatchAccumulator`
#[derive(Debug)]
pub struct SinkBatch<R> {
    /// Stream being loaded
    pub stream: StreamDescriptor,
    /// Worker partition
    pub partition: usize,
    /// Buffered records
    pub records: Vec<R>,
    /// Bytes buffered
    pub bytes: u64,
    /// Parts already sent to the sink
    pub parts_loaded: u64,
}

impl<R> SinkBatch<R> {
    pub(crate) fn new(stream: StreamDescriptor, partition: usize) -> Self {
        Self {
            stream,
            partition,
            records: Vec::new(),
            bytes: 0,
            parts_loaded: 0,
        }
    }
}

/// Result of one call to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedBatch {
    /// Stream loaded
    pub stream: StreamDescriptor,
    /// Zero-based part number within the batch
    pub part: u64,
    /// Records loaded by this part
    pub records: u64,
    /// Bytes loaded by this part
    pub bytes: u64,
    /// State the part reached
    pub state: BatchState,
}

impl WithBatchState for LoadedBatch {
    fn batch_state(&self) -> BatchState {
        self.state
    }
}
