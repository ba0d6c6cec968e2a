//! Sink-backed batch accumulator

use super::types::{LoadRecord, LoadedBatch, SinkBatch};
use crate::config::BatchingConfig;
use crate::error::{Error, Result};
use crate::pipeline::{BatchAccumulator, BatchAccumulatorResult, BatchState};
use crate::types::StreamDescriptor;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Destination write operation
///
/// Whatever the sink does is opaque to the pipeline; once `load` returns
/// `Ok` the records are considered durable.
#[async_trait]
pub trait BatchLoader: Send + Sync + 'static {
    /// Record type the sink accepts
    type Record: Send + 'static;

    /// Write one batch of records for `stream`
    async fn load(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: Vec<Self::Record>,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<L: BatchLoader> BatchLoader for Arc<L> {
    type Record = L::Record;

    async fn load(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: Vec<Self::Record>,
    ) -> anyhow::Result<()> {
        L::load(self, stream, partition, records).await
    }
}

/// Buffers records per stream and writes them through a `BatchLoader`
///
/// Crossing the record or byte limit writes the buffer as an intermediate
/// part in state `Persisted`; `finish` writes whatever is left and completes
/// the batch.
pub struct SinkBatchAccumulator<L: BatchLoader> {
    loader: L,
    max_records: usize,
    max_bytes: u64,
    _record: PhantomData<fn() -> L::Record>,
}

impl<L: BatchLoader> SinkBatchAccumulator<L> {
    /// Create an accumulator with the given limits
    pub fn new(loader: L, max_records: usize, max_bytes: u64) -> Self {
        Self {
            loader,
            max_records: max_records.max(1),
            max_bytes: max_bytes.max(1),
            _record: PhantomData,
        }
    }

    /// Create an accumulator from the `batching` config section
    pub fn from_config(loader: L, config: &BatchingConfig) -> Self {
        Self::new(loader, config.max_records_per_batch, config.max_bytes_per_batch)
    }

    fn is_full(&self, batch: &SinkBatch<L::Record>) -> bool {
        batch.records.len() >= self.max_records || batch.bytes >= self.max_bytes
    }

    async fn load_part(
        &self,
        batch: &mut SinkBatch<L::Record>,
        state: BatchState,
    ) -> Result<LoadedBatch> {
        let records = std::mem::take(&mut batch.records);
        let loaded = LoadedBatch {
            stream: batch.stream.clone(),
            part: batch.parts_loaded,
            records: records.len() as u64,
            bytes: std::mem::take(&mut batch.bytes),
            state,
        };

        if !records.is_empty() {
            self.loader
                .load(&batch.stream, batch.partition, records)
                .await
                .map_err(Error::Anyhow)?;
            batch.parts_loaded += 1;
        }
        debug!(
            stream = %loaded.stream,
            partition = batch.partition,
            part = loaded.part,
            records = loaded.records,
            bytes = loaded.bytes,
            "Loaded batch part"
        );
        Ok(loaded)
    }
}

#[async_trait]
impl<L: BatchLoader> BatchAccumulator for SinkBatchAccumulator<L> {
    type Key = StreamDescriptor;
    type Input = LoadRecord<L::Record>;
    type State = SinkBatch<L::Record>;
    type Output = LoadedBatch;

    async fn start(&self, key: &StreamDescriptor, partition: usize) -> Result<Self::State> {
        Ok(SinkBatch::new(key.clone(), partition))
    }

    async fn accept(
        &self,
        input: Self::Input,
        mut state: Self::State,
    ) -> Result<BatchAccumulatorResult<Self::State, Self::Output>> {
        state.bytes += input.size_bytes;
        state.records.push(input.data);

        if !self.is_full(&state) {
            return Ok(BatchAccumulatorResult::NoOutput(state));
        }
        let loaded = self.load_part(&mut state, BatchState::Persisted).await?;
        Ok(BatchAccumulatorResult::IntermediateOutput(state, loaded))
    }

    async fn finish(&self, mut state: Self::State) -> Result<Self::Output> {
        self.load_part(&mut state, BatchState::Complete).await
    }
}
