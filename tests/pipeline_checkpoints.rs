//! End-to-end tests: records dispatched through the load pipeline into a
//! sink, with checkpoints released from the ledger and enriched from the
//! committed stats.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use solidafy_load::loader::{BatchLoader, LoadRecord, SinkBatchAccumulator};
use solidafy_load::partition::ByStreamPartitioner;
use solidafy_load::pipeline::{
    BatchStateUpdate, LoadPipeline, LoadPipelineStep, RecordDispatcher, StepQueue,
};
use solidafy_load::queue::{EnqueueMode, PartitionedQueue};
use solidafy_load::state::{
    Checkpoint, CheckpointLedger, CheckpointMessage, ConfiguredNamespaceMapper, GlobalCheckpoint,
    IdentityMapper, NamespaceMapper, StateStatsEnricher, StreamCheckpoint,
};
use solidafy_load::stats::{CommittedStatsStore, ObservabilityMetric, StateAdditionalStatsStore};
use solidafy_load::{PartitionKey, PipelineConfig, StateKey, StreamDescriptor};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Default)]
struct RecordingSink {
    loads: Mutex<Vec<(StreamDescriptor, Vec<Value>)>>,
}

impl RecordingSink {
    fn records_loaded(&self) -> usize {
        self.loads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, records)| records.len())
            .sum()
    }

    fn loads(&self) -> usize {
        self.loads.lock().unwrap().len()
    }
}

#[async_trait]
impl BatchLoader for RecordingSink {
    type Record = Value;

    async fn load(
        &self,
        stream: &StreamDescriptor,
        _partition: usize,
        records: Vec<Value>,
    ) -> anyhow::Result<()> {
        self.loads.lock().unwrap().push((stream.clone(), records));
        Ok(())
    }
}

fn pk(key: &str) -> PartitionKey {
    PartitionKey::new(key)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BatchStateUpdate>) -> Vec<BatchStateUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

fn destination_count(message: &CheckpointMessage) -> i64 {
    let stats = match message {
        CheckpointMessage::Stream(checkpoint) => checkpoint.destination_stats.as_ref(),
        CheckpointMessage::Global(checkpoint) => checkpoint.destination_stats.as_ref(),
    };
    stats.map_or(-1, |stats| stats.record_count)
}

// ============================================================================
// Pipeline to checkpoint
// ============================================================================

#[tokio::test]
async fn test_loaded_records_release_enriched_checkpoints() {
    let stats = Arc::new(CommittedStatsStore::new());
    let ledger = CheckpointLedger::new();
    let enricher = StateStatsEnricher::new(Arc::clone(&stats), IdentityMapper);
    let users = StreamDescriptor::new(Some("public"), "users");

    let input: StepQueue<StreamDescriptor, LoadRecord<Value>> =
        Arc::new(PartitionedQueue::new(4, 8, EnqueueMode::Strict).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let step = LoadPipelineStep::new(
        "load",
        SinkBatchAccumulator::new(Arc::clone(&sink), 4, u64::MAX),
        Arc::clone(&input),
    )
    .with_batch_updates(tx);
    let dispatcher = RecordDispatcher::new(input, ByStreamPartitioner, Arc::clone(&stats));
    let running = LoadPipeline::new().with_step(step).start().unwrap();

    // 25 records over three checkpoints: 10, 10, 5
    let mut bytes_per_checkpoint = [0_i64; 3];
    for id in 0..25_u64 {
        let checkpoint = (id / 10) as usize;
        let partition = pk(&format!("ckpt-{checkpoint}"));
        let record = LoadRecord::json(json!({"id": id}));
        let size = record.size_bytes;
        bytes_per_checkpoint[checkpoint] += size as i64;

        ledger.record_dispatched(&users, &partition, 1);
        assert!(dispatcher
            .dispatch(users.clone(), record, partition, size)
            .await
            .unwrap());
    }
    dispatcher.end_of_stream(&users).await.unwrap();
    dispatcher.close();

    let summary = running.join().await.unwrap();
    let load = summary.step("load").unwrap();
    assert_eq!(load.messages_accepted, 25);
    assert_eq!(sink.records_loaded(), 25);
    // six full parts of four, then the remaining one on finish
    assert_eq!(sink.loads(), 7);

    for update in drain(&mut rx) {
        assert!(update.state.is_terminal());
        ledger.apply(&update);
    }
    let partitions = [pk("ckpt-0"), pk("ckpt-1"), pk("ckpt-2")];
    assert!(ledger.all_persisted(&users, &partitions));

    let mut cumulative_bytes = 0;
    for (id, partition) in partitions.iter().enumerate() {
        let mut message = CheckpointMessage::Stream(StreamCheckpoint::new(
            Some("public"),
            "users",
            json!({"cursor": id}),
            if id < 2 { 10 } else { 5 },
        ));
        let result = enricher.enrich_message(
            &mut message,
            &StateKey::new(id as u64 + 1, vec![partition.clone()]),
        );
        cumulative_bytes += bytes_per_checkpoint[id];

        let expected_count = if id < 2 { 10 } else { 5 };
        assert_eq!(destination_count(&message), expected_count);
        assert_eq!(result.committed_stats.bytes, bytes_per_checkpoint[id]);
        assert_eq!(result.cumulative_stats.bytes, cumulative_bytes);

        let CheckpointMessage::Stream(checkpoint) = &message else {
            panic!("expected a stream checkpoint");
        };
        assert_eq!(checkpoint.total_records, Some(10 * id as i64 + expected_count));
        assert_eq!(checkpoint.total_bytes, Some(cumulative_bytes));
    }

    assert_eq!(stats.live_stats(&users).count, 0);
    assert_eq!(stats.cumulative_stats(&users).count, 25);
}

#[tokio::test]
async fn test_checkpoint_waits_for_unflushed_batch() {
    let stats = Arc::new(CommittedStatsStore::new());
    let ledger = CheckpointLedger::new();
    let orders = StreamDescriptor::named("orders");

    let input: StepQueue<StreamDescriptor, LoadRecord<Value>> =
        Arc::new(PartitionedQueue::new(1, 16, EnqueueMode::Strict).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let step = LoadPipelineStep::new(
        "load",
        SinkBatchAccumulator::new(Arc::clone(&sink), 100, u64::MAX),
        Arc::clone(&input),
    )
    .with_batch_updates(tx);
    let dispatcher = RecordDispatcher::new(input, ByStreamPartitioner, Arc::clone(&stats));
    let running = LoadPipeline::new().with_step(step).start().unwrap();

    for id in 0..3 {
        ledger.record_dispatched(&orders, &pk("p1"), 1);
        let record = LoadRecord::json(json!({"id": id}));
        let size = record.size_bytes;
        dispatcher
            .dispatch(orders.clone(), record, pk("p1"), size)
            .await
            .unwrap();
    }

    // below the batch limit nothing is loaded until the stream ends
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    for update in drain(&mut rx) {
        ledger.apply(&update);
    }
    assert!(!ledger.is_persisted(&orders, &pk("p1")));
    assert_eq!(ledger.pending(&orders, &pk("p1")), 3);
    assert_eq!(sink.loads(), 0);

    dispatcher.end_of_stream(&orders).await.unwrap();
    dispatcher.close();
    running.join().await.unwrap();

    for update in drain(&mut rx) {
        ledger.apply(&update);
    }
    assert!(ledger.is_persisted(&orders, &pk("p1")));
    assert_eq!(sink.loads(), 1);
}

// ============================================================================
// Global checkpoints
// ============================================================================

#[tokio::test]
async fn test_global_checkpoint_sums_streams_and_metrics() {
    let stats = Arc::new(CommittedStatsStore::new());
    let additional = Arc::new(StateAdditionalStatsStore::new());
    let enricher = StateStatsEnricher::new(Arc::clone(&stats), IdentityMapper)
        .with_additional_stats(Arc::clone(&additional));

    let users = StreamDescriptor::new(Some("public"), "users");
    let orders = StreamDescriptor::new(Some("public"), "orders");

    for _ in 0..4 {
        stats.accept_record(&users, &pk("g1"), 10);
    }
    for _ in 0..6 {
        stats.accept_record(&orders, &pk("g1"), 20);
    }
    // belongs to a later checkpoint
    stats.accept_record(&orders, &pk("g2"), 20);
    additional.add(&pk("g1"), &users, ObservabilityMetric::NulledValueCount, 2.0);
    additional.add(&pk("g1"), &orders, ObservabilityMetric::NulledValueCount, 1.0);
    additional.add(&pk("g1"), &orders, ObservabilityMetric::TruncatedByteCount, 64.0);

    let mut message = CheckpointMessage::Global(GlobalCheckpoint {
        shared_state: json!({"lsn": 42}),
        checkpoints: vec![
            Checkpoint::new(Some("public"), "users", json!({})),
            Checkpoint::new(Some("public"), "orders", json!({})),
        ],
        ..GlobalCheckpoint::default()
    });
    let result = enricher.enrich_message(&mut message, &StateKey::new(1, vec![pk("g1")]));

    assert_eq!(result.committed_stats.count, 10);
    assert_eq!(result.committed_stats.bytes, 160);

    let wire: Value = serde_json::from_str(&message.to_json_line().unwrap()).unwrap();
    assert_eq!(
        wire,
        json!({
            "type": "GLOBAL",
            "sharedState": {"lsn": 42},
            "checkpoints": [
                {
                    "unmappedNamespace": "public",
                    "unmappedName": "users",
                    "state": {},
                    "totalRecords": 4,
                    "totalBytes": 40
                },
                {
                    "unmappedNamespace": "public",
                    "unmappedName": "orders",
                    "state": {},
                    "totalRecords": 6,
                    "totalBytes": 120
                }
            ],
            "destinationStats": {
                "recordCount": 10,
                "additionalStats": {
                    "nulledValueCount": 3.0,
                    "truncatedByteCount": 64.0,
                    "truncatedValueCount": 0.0
                }
            },
            "totalRecords": 10,
            "totalBytes": 160
        })
    );

    // the later partition is still live
    assert_eq!(stats.live_stats(&orders).count, 1);
}

// ============================================================================
// Configured namespaces
// ============================================================================

#[tokio::test]
async fn test_config_driven_mapper_commits_mapped_stream() {
    let config = PipelineConfig::from_yaml_str(
        r#"
namespace:
  definition: custom_format
  custom_format: "raw_${SOURCE_NAMESPACE}"
  stream_prefix: "src_"
"#,
    )
    .unwrap();
    let mapper = ConfiguredNamespaceMapper::new(config.namespace.clone());
    let stats = Arc::new(CommittedStatsStore::new());
    let enricher = StateStatsEnricher::new(Arc::clone(&stats), mapper.clone());

    let mapped = mapper.map(Some("public"), "users");
    assert_eq!(mapped, StreamDescriptor::new(Some("raw_public"), "src_users"));

    stats.accept_record(&mapped, &pk("p1"), 8);
    stats.accept_record(&mapped, &pk("p1"), 8);

    let mut checkpoint = StreamCheckpoint::new(Some("public"), "users", json!({}), 2);
    let result = enricher.enrich_stream(&mut checkpoint, &StateKey::new(1, vec![pk("p1")]));

    assert_eq!(result.committed_stats.count, 2);
    assert_eq!(checkpoint.destination_stats.unwrap().record_count, 2);
    assert_eq!(checkpoint.total_bytes, Some(16));
}
