//! Tests for loader module

use super::*;
use crate::error::Error;
use crate::pipeline::{BatchAccumulator, BatchAccumulatorResult, BatchState};
use crate::types::StreamDescriptor;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingLoader {
    loads: Mutex<Vec<(String, usize, Vec<u32>)>>,
    fail: bool,
}

#[async_trait]
impl BatchLoader for RecordingLoader {
    type Record = u32;

    async fn load(
        &self,
        stream: &StreamDescriptor,
        partition: usize,
        records: Vec<u32>,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("destination rejected {} records", records.len());
        }
        self.loads
            .lock()
            .unwrap()
            .push((stream.to_string(), partition, records));
        Ok(())
    }
}

fn users() -> StreamDescriptor {
    StreamDescriptor::named("users")
}

#[tokio::test]
async fn test_record_limit_flushes_intermediate_part() {
    let loader = Arc::new(RecordingLoader::default());
    let accumulator = SinkBatchAccumulator::new(Arc::clone(&loader), 2, 1 << 20);

    let state = accumulator.start(&users(), 3).await.unwrap();
    let state = match accumulator.accept(LoadRecord::new(1, 10), state).await.unwrap() {
        BatchAccumulatorResult::NoOutput(state) => state,
        other => panic!("expected no output, got {other:?}"),
    };
    let (state, loaded) = match accumulator.accept(LoadRecord::new(2, 10), state).await.unwrap() {
        BatchAccumulatorResult::IntermediateOutput(state, loaded) => (state, loaded),
        other => panic!("expected intermediate output, got {other:?}"),
    };

    assert_eq!(
        loaded,
        LoadedBatch {
            stream: users(),
            part: 0,
            records: 2,
            bytes: 20,
            state: BatchState::Persisted,
        }
    );
    assert!(state.records.is_empty());
    assert_eq!(state.bytes, 0);
    assert_eq!(
        loader.loads.lock().unwrap().clone(),
        vec![("users".to_string(), 3, vec![1, 2])]
    );
}

#[tokio::test]
async fn test_byte_limit_flushes() {
    let loader = RecordingLoader::default();
    let accumulator = SinkBatchAccumulator::new(loader, 100, 50);

    let state = accumulator.start(&users(), 0).await.unwrap();
    let result = accumulator.accept(LoadRecord::new(7, 64), state).await.unwrap();
    assert!(matches!(
        result,
        BatchAccumulatorResult::IntermediateOutput(_, LoadedBatch { records: 1, bytes: 64, .. })
    ));
}

#[tokio::test]
async fn test_finish_loads_remainder_and_completes() {
    let loader = Arc::new(RecordingLoader::default());
    let accumulator = SinkBatchAccumulator::new(Arc::clone(&loader), 2, 1 << 20);

    let mut state = accumulator.start(&users(), 0).await.unwrap();
    for value in 0..3 {
        state = match accumulator.accept(LoadRecord::new(value, 1), state).await.unwrap() {
            BatchAccumulatorResult::NoOutput(state)
            | BatchAccumulatorResult::IntermediateOutput(state, _) => state,
            BatchAccumulatorResult::FinalOutput(_) => panic!("unexpected final output"),
        };
    }
    let last = accumulator.finish(state).await.unwrap();

    assert_eq!(last.part, 1);
    assert_eq!(last.records, 1);
    assert_eq!(last.state, BatchState::Complete);
    assert_eq!(loader.loads.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_finish_empty_batch_skips_sink() {
    let loader = Arc::new(RecordingLoader::default());
    let accumulator = SinkBatchAccumulator::new(Arc::clone(&loader), 10, 1 << 20);

    let state = accumulator.start(&users(), 0).await.unwrap();
    let last = accumulator.finish(state).await.unwrap();

    assert_eq!(last.records, 0);
    assert_eq!(last.state, BatchState::Complete);
    assert!(loader.loads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sink_failure_is_reported() {
    let loader = RecordingLoader {
        fail: true,
        ..RecordingLoader::default()
    };
    let accumulator = SinkBatchAccumulator::new(loader, 1, 1 << 20);

    let state = accumulator.start(&users(), 0).await.unwrap();
    let err = accumulator
        .accept(LoadRecord::new(1, 1), state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Anyhow(_)));
    assert_eq!(err.to_string(), "destination rejected 1 records");
}

#[test]
fn test_json_record_size() {
    let record = LoadRecord::json(json!({"id": 1}));
    assert_eq!(record.size_bytes, 8);
}
