//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::loader::{BatchLoader, LoadRecord, SinkBatchAccumulator};
use crate::partition::ByStreamPartitioner;
use crate::pipeline::{BatchStateUpdate, LoadPipeline, LoadPipelineStep, RecordDispatcher, StepQueue};
use crate::queue::{MemoryManager, MemoryReservation, PartitionedQueue, QueueCapacity};
use crate::state::{
    CheckpointLedger, CheckpointMessage, ConfiguredNamespaceMapper, NamespaceMapper,
    StateStatsEnricher, StreamCheckpoint,
};
use crate::stats::{CommittedStatsStore, ObservabilityMetric, StateAdditionalStatsStore};
use crate::types::{PartitionKey, StateKey, StreamDescriptor};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const SOURCE_NAMESPACE: &str = "public";

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Capacity => self.capacity(),
            Commands::Validate => self.validate(),
            Commands::Simulate {
                streams,
                records,
                checkpoint_every,
                nulled_every,
            } => {
                let plan = SimulationPlan {
                    streams: *streams,
                    records: *records,
                    checkpoint_every: *checkpoint_every,
                    nulled_every: *nulled_every,
                };
                self.simulate(plan).await
            }
        }
    }

    /// Load the config file, or defaults when none was given
    pub fn load_config(&self) -> Result<PipelineConfig> {
        match &self.cli.config {
            Some(path) => PipelineConfig::from_file(path),
            None => Ok(PipelineConfig::default()),
        }
    }

    fn output<T: Serialize>(&self, value: &T) -> Result<()> {
        let line = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(value)?,
            OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        };
        println!("{line}");
        Ok(())
    }

    fn capacity(&self) -> Result<()> {
        let config = self.load_config()?;
        let (reservation, capacity) = plan_queues(&config)?;
        self.output(&json!({
            "reserved_bytes": reservation.bytes(),
            "num_partitions": config.pipeline.num_partitions,
            "capacity": capacity,
            "max_buffered_bytes": capacity.max_buffered_bytes(config.pipeline.num_partitions),
        }))
    }

    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        config.validate()?;
        self.output(&config)
    }

    async fn simulate(&self, plan: SimulationPlan) -> Result<()> {
        if plan.checkpoint_every == 0 {
            return Err(Error::invalid_value("checkpoint_every", "must be greater than 0"));
        }
        let config = self.load_config()?;
        let (_reservation, capacity) = plan_queues(&config)?;

        let stats = Arc::new(CommittedStatsStore::new());
        let additional = Arc::new(StateAdditionalStatsStore::new());
        let ledger = Arc::new(CheckpointLedger::new());
        let mapper = ConfiguredNamespaceMapper::new(config.namespace.clone());
        let enricher = StateStatsEnricher::new(Arc::clone(&stats), mapper.clone())
            .with_additional_stats(Arc::clone(&additional));

        let input: StepQueue<StreamDescriptor, LoadRecord<Value>> = Arc::new(PartitionedQueue::new(
            config.pipeline.num_partitions,
            capacity.slots_per_partition,
            config.pipeline.queue_mode,
        )?);
        let sink = Arc::new(CountingSink::default());
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let step = LoadPipelineStep::new(
            "load",
            SinkBatchAccumulator::from_config(Arc::clone(&sink), &config.batching),
            Arc::clone(&input),
        )
        .with_batch_updates(updates_tx);
        let dispatcher = RecordDispatcher::new(input, ByStreamPartitioner, Arc::clone(&stats));
        let running = LoadPipeline::new().with_step(step).start()?;

        let (cuts_tx, cuts_rx) = mpsc::unbounded_channel();
        let produce = produce_records(&plan, &mapper, &dispatcher, &additional, &ledger, cuts_tx);
        let release = self.release_checkpoints(updates_rx, cuts_rx, &ledger, &enricher);

        let (released, summary) = tokio::try_join!(release, async {
            let produced = produce.await;
            if produced.is_err() {
                dispatcher.close();
            }
            // a pipeline failure explains a failed dispatch better than the dispatch error
            let summary = running.join().await?;
            produced.map(|()| summary)
        })?;

        info!(
            checkpoints = released,
            records_loaded = sink.records.load(Ordering::Relaxed),
            batches_loaded = sink.batches.load(Ordering::Relaxed),
            duration_ms = summary.duration_ms,
            "Simulation finished"
        );
        Ok(())
    }

    /// Release checkpoints in cut order once their records are persisted
    async fn release_checkpoints(
        &self,
        mut updates: mpsc::UnboundedReceiver<BatchStateUpdate>,
        mut cuts: mpsc::UnboundedReceiver<PendingCheckpoint>,
        ledger: &CheckpointLedger,
        enricher: &StateStatsEnricher,
    ) -> Result<u64> {
        let mut pending: VecDeque<PendingCheckpoint> = VecDeque::new();
        let mut released = 0;
        let (mut updates_open, mut cuts_open) = (true, true);

        while updates_open || cuts_open {
            tokio::select! {
                update = updates.recv(), if updates_open => match update {
                    Some(update) => ledger.apply(&update),
                    None => updates_open = false,
                },
                cut = cuts.recv(), if cuts_open => match cut {
                    Some(cut) => pending.push_back(cut),
                    None => cuts_open = false,
                },
            }

            while pending
                .front()
                .is_some_and(|cut| ledger.is_persisted(&cut.stream, &cut.partition))
            {
                let Some(cut) = pending.pop_front() else {
                    break;
                };
                let mut message = CheckpointMessage::Stream(StreamCheckpoint::new(
                    Some(SOURCE_NAMESPACE),
                    cut.source_name,
                    json!({"cursor": cut.cursor}),
                    cut.records as i64,
                ));
                enricher.enrich_message(
                    &mut message,
                    &StateKey::new(cut.id, vec![cut.partition.clone()]),
                );
                self.output(&message)?;
                ledger.forget(&cut.stream, &cut.partition);
                released += 1;
            }
        }

        if !pending.is_empty() {
            return Err(Error::checkpoint(format!(
                "{} checkpoints were never persisted",
                pending.len()
            )));
        }
        Ok(released)
    }
}

/// Reserve the queue budget and size the queues
fn plan_queues(config: &PipelineConfig) -> Result<(MemoryReservation, QueueCapacity)> {
    let total = config.memory.total_bytes.unwrap_or(config.memory.reserved_bytes);
    let reservation = MemoryManager::new(total).reserve(config.memory.reserved_bytes)?;
    let capacity = config.capacity_calculator().calculate()?;
    if capacity.message_size_was_clamped {
        warn!(
            expected_message_size_bytes = config.memory.expected_message_size_bytes,
            clamped_message_size_bytes = capacity.clamped_message_size_bytes,
            "Expected message size does not fit the queue budget, clamping"
        );
    }
    info!(
        reserved_bytes = reservation.bytes(),
        partitions = config.pipeline.num_partitions,
        slots_per_partition = capacity.slots_per_partition,
        "Sized queues"
    );
    Ok((reservation, capacity))
}

#[derive(Debug, Clone, Copy)]
struct SimulationPlan {
    streams: usize,
    records: u64,
    checkpoint_every: u64,
    nulled_every: u64,
}

/// A cut checkpoint waiting for its records to be persisted
#[derive(Debug)]
struct PendingCheckpoint {
    id: u64,
    stream: StreamDescriptor,
    source_name: String,
    partition: PartitionKey,
    cursor: u64,
    records: u64,
}

/// Generate records round-robin across streams, cutting a checkpoint every
/// `checkpoint_every` records of a stream
async fn produce_records(
    plan: &SimulationPlan,
    mapper: &ConfiguredNamespaceMapper,
    dispatcher: &RecordDispatcher<StreamDescriptor, LoadRecord<Value>>,
    additional: &StateAdditionalStatsStore,
    ledger: &CheckpointLedger,
    cuts: mpsc::UnboundedSender<PendingCheckpoint>,
) -> Result<()> {
    let sources: Vec<(String, StreamDescriptor)> = (0..plan.streams)
        .map(|i| {
            let name = format!("stream_{i}");
            let stream = mapper.map(Some(SOURCE_NAMESPACE), &name);
            (name, stream)
        })
        .collect();
    let mut next_id = 0;

    for record in 0..plan.records {
        let partition = PartitionKey::new(format!("ckpt-{}", record / plan.checkpoint_every));
        for (name, stream) in &sources {
            let nulled = plan.nulled_every > 0 && record % plan.nulled_every == 0;
            if nulled {
                additional.add(&partition, stream, ObservabilityMetric::NulledValueCount, 1.0);
            }
            let value = json!({
                "id": record,
                "stream": name,
                "note": if nulled { Value::Null } else { json!("ok") },
            });

            ledger.record_dispatched(stream, &partition, 1);
            let data = LoadRecord::json(value);
            let size = data.size_bytes;
            let queued = dispatcher
                .dispatch(stream.clone(), data, partition.clone(), size)
                .await?;
            if !queued {
                ledger.record_dropped(stream, &partition, 1);
            }

            let seen = record + 1;
            if seen % plan.checkpoint_every == 0 || seen == plan.records {
                next_id += 1;
                let cut = PendingCheckpoint {
                    id: next_id,
                    stream: stream.clone(),
                    source_name: name.clone(),
                    partition: partition.clone(),
                    cursor: record,
                    records: seen - record / plan.checkpoint_every * plan.checkpoint_every,
                };
                cuts.send(cut)
                    .map_err(|_| Error::internal("checkpoint release loop stopped early"))?;
            }
        }
    }

    for (_, stream) in &sources {
        dispatcher.end_of_stream(stream).await?;
    }
    dispatcher.close();
    Ok(())
}

/// Sink that only counts what it is given
#[derive(Debug, Default)]
struct CountingSink {
    records: AtomicU64,
    batches: AtomicU64,
}

#[async_trait]
impl BatchLoader for CountingSink {
    type Record = Value;

    async fn load(
        &self,
        _stream: &StreamDescriptor,
        _partition: usize,
        records: Vec<Value>,
    ) -> anyhow::Result<()> {
        self.records.fetch_add(records.len() as u64, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
