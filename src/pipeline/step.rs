//! Pipeline step
//!
//! One worker per input partition. Each worker owns the accumulator states
//! of the keys routed to its partition, so no state is ever shared.

use super::accumulator::{BatchAccumulator, BatchAccumulatorResult};
use super::types::{
    merge_counts, BatchStateUpdate, CheckpointCounts, PipelineEvent, PipelineMessage,
    StepCounters, StepSummary, WithBatchState,
};
use super::{PipelineContext, PipelineStep};
use crate::error::{Error, Result};
use crate::partition::{OutputPartitioner, WithStream};
use crate::queue::{CloseQueue, PartitionedQueue};
use crate::types::StreamDescriptor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace};

/// Queue of events between two steps
pub type StepQueue<K, T> = Arc<PartitionedQueue<PipelineEvent<K, T>>>;

struct StepOutput<K, O> {
    queue: StepQueue<K, O>,
    partitioner: Arc<dyn OutputPartitioner<K>>,
}

struct OpenBatch<S> {
    state: S,
    checkpoint_counts: CheckpointCounts,
}

/// A stage of the load pipeline driving one `BatchAccumulator`
pub struct LoadPipelineStep<A: BatchAccumulator> {
    name: String,
    accumulator: Arc<A>,
    input: StepQueue<A::Key, A::Input>,
    output: Option<StepOutput<A::Key, A::Output>>,
    batch_updates: Option<mpsc::UnboundedSender<BatchStateUpdate>>,
    upstream_workers: usize,
    live_workers: AtomicUsize,
    counters: StepCounters,
}

impl<A: BatchAccumulator> LoadPipelineStep<A> {
    /// Create a step reading from `input`, one worker per input partition
    pub fn new(name: impl Into<String>, accumulator: A, input: StepQueue<A::Key, A::Input>) -> Self {
        Self {
            name: name.into(),
            accumulator: Arc::new(accumulator),
            input,
            output: None,
            batch_updates: None,
            upstream_workers: 1,
            live_workers: AtomicUsize::new(0),
            counters: StepCounters::default(),
        }
    }

    /// Forward outputs to the next step's queue, routed by `partitioner`
    #[must_use]
    pub fn with_output(
        mut self,
        queue: StepQueue<A::Key, A::Output>,
        partitioner: impl OutputPartitioner<A::Key> + 'static,
    ) -> Self {
        self.output = Some(StepOutput {
            queue,
            partitioner: Arc::new(partitioner),
        });
        self
    }

    /// Report outputs that reach a terminal batch state on `updates`
    #[must_use]
    pub fn with_batch_updates(mut self, updates: mpsc::UnboundedSender<BatchStateUpdate>) -> Self {
        self.batch_updates = Some(updates);
        self
    }

    /// Number of upstream workers that each send an end-of-stream marker
    /// into every partition
    ///
    /// A stream is finished on a partition only after all of them arrived.
    #[must_use]
    pub fn with_upstream_workers(mut self, upstream_workers: usize) -> Self {
        self.upstream_workers = upstream_workers.max(1);
        self
    }

    fn failed(&self, partition: usize, key: &A::Key, err: &Error) -> Error {
        Error::accumulation(&self.name, partition, key.stream().to_string(), err.to_string())
    }

    async fn run_worker(self: Arc<Self>, partition: usize, context: PipelineContext) -> Result<()> {
        debug!(step = %self.name, partition, "Worker started");
        let result = self.drive(partition, &context).await;

        if self.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(output) = &self.output {
                debug!(step = %self.name, "Last worker done, closing output queue");
                output.queue.close();
            }
        }
        debug!(step = %self.name, partition, ok = result.is_ok(), "Worker stopped");
        result
    }

    async fn drive(&self, partition: usize, context: &PipelineContext) -> Result<()> {
        let mut open: HashMap<A::Key, OpenBatch<A::State>> = HashMap::new();
        let mut ended: HashMap<StreamDescriptor, usize> = HashMap::new();

        while let Some(event) = self.input.dequeue(partition).await? {
            match event {
                PipelineEvent::Message(message) => {
                    self.accept(partition, message, &mut open, context).await?;
                }
                PipelineEvent::EndOfStream { stream } => {
                    let seen = ended.entry(stream.clone()).or_default();
                    *seen += 1;
                    if *seen != self.upstream_workers {
                        continue;
                    }
                    trace!(step = %self.name, partition, stream = %stream, "Stream ended");
                    let keys: Vec<A::Key> = open
                        .keys()
                        .filter(|key| key.stream() == &stream)
                        .cloned()
                        .collect();
                    self.finish_keys(partition, keys, &mut open, context).await?;
                    self.forward_end_of_stream(&stream, context).await?;
                }
            }
        }

        // Buffered state is abandoned when the pipeline is failing
        if context.is_shutting_down() {
            return Ok(());
        }
        let keys: Vec<A::Key> = open.keys().cloned().collect();
        self.finish_keys(partition, keys, &mut open, context).await
    }

    async fn accept(
        &self,
        partition: usize,
        message: PipelineMessage<A::Key, A::Input>,
        open: &mut HashMap<A::Key, OpenBatch<A::State>>,
        context: &PipelineContext,
    ) -> Result<()> {
        let PipelineMessage {
            key,
            value,
            checkpoint_counts,
        } = message;

        let OpenBatch {
            state,
            checkpoint_counts: mut counts,
        } = match open.remove(&key) {
            Some(batch) => batch,
            None => OpenBatch {
                state: self
                    .accumulator
                    .start(&key, partition)
                    .await
                    .map_err(|e| self.failed(partition, &key, &e))?,
                checkpoint_counts: CheckpointCounts::new(),
            },
        };
        merge_counts(&mut counts, checkpoint_counts);
        StepCounters::bump(&self.counters.messages_accepted);

        let result = self
            .accumulator
            .accept(value, state)
            .await
            .map_err(|e| self.failed(partition, &key, &e))?;

        match result {
            BatchAccumulatorResult::NoOutput(state) => {
                open.insert(
                    key,
                    OpenBatch {
                        state,
                        checkpoint_counts: counts,
                    },
                );
            }
            BatchAccumulatorResult::IntermediateOutput(state, output) => {
                open.insert(
                    key.clone(),
                    OpenBatch {
                        state,
                        checkpoint_counts: CheckpointCounts::new(),
                    },
                );
                self.emit(&key, output, counts, context).await?;
            }
            BatchAccumulatorResult::FinalOutput(output) => {
                self.emit(&key, output, counts, context).await?;
            }
        }
        Ok(())
    }

    async fn finish_keys(
        &self,
        partition: usize,
        keys: Vec<A::Key>,
        open: &mut HashMap<A::Key, OpenBatch<A::State>>,
        context: &PipelineContext,
    ) -> Result<()> {
        for key in keys {
            let Some(batch) = open.remove(&key) else {
                continue;
            };
            let output = self
                .accumulator
                .finish(batch.state)
                .await
                .map_err(|e| self.failed(partition, &key, &e))?;
            self.emit(&key, output, batch.checkpoint_counts, context).await?;
        }
        Ok(())
    }

    async fn emit(
        &self,
        key: &A::Key,
        output: A::Output,
        checkpoint_counts: CheckpointCounts,
        context: &PipelineContext,
    ) -> Result<()> {
        StepCounters::bump(&self.counters.outputs_emitted);

        let state = output.batch_state();
        if state.is_terminal() {
            StepCounters::bump(&self.counters.batches_completed);
            if let Some(updates) = &self.batch_updates {
                let update = BatchStateUpdate {
                    stream: key.stream().clone(),
                    checkpoint_counts: checkpoint_counts.clone(),
                    state,
                    step: self.name.clone(),
                };
                if updates.send(update).is_err() {
                    debug!(step = %self.name, "Batch state receiver dropped");
                }
            }
        }

        if let Some(output_queue) = &self.output {
            let partition = output_queue
                .partitioner
                .partition(key, output_queue.queue.num_partitions());
            let event = PipelineEvent::message(key.clone(), output, checkpoint_counts);
            self.forward(&output_queue.queue, partition, event, context)
                .await?;
        }
        Ok(())
    }

    async fn forward_end_of_stream(
        &self,
        stream: &StreamDescriptor,
        context: &PipelineContext,
    ) -> Result<()> {
        let Some(output_queue) = &self.output else {
            return Ok(());
        };
        for partition in 0..output_queue.queue.num_partitions() {
            let event = PipelineEvent::end_of_stream(stream.clone());
            self.forward(&output_queue.queue, partition, event, context)
                .await?;
        }
        Ok(())
    }

    async fn forward(
        &self,
        queue: &StepQueue<A::Key, A::Output>,
        partition: usize,
        event: PipelineEvent<A::Key, A::Output>,
        context: &PipelineContext,
    ) -> Result<()> {
        match queue.enqueue(partition, event).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_shutdown() && context.is_shutting_down() => Ok(()),
            Err(err) if err.is_shutdown() => Err(Error::internal(format!(
                "output queue of step '{}' closed while the pipeline was running",
                self.name
            ))),
            Err(err) => Err(err),
        }
    }
}

impl<A: BatchAccumulator> PipelineStep for LoadPipelineStep<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_workers(&self) -> usize {
        self.input.num_partitions()
    }

    fn spawn(self: Arc<Self>, context: &PipelineContext, tasks: &mut JoinSet<Result<()>>) {
        let workers = self.num_workers();
        self.live_workers.store(workers, Ordering::Release);
        for partition in 0..workers {
            let step = Arc::clone(&self);
            let context = context.clone();
            tasks.spawn(step.run_worker(partition, context));
        }
    }

    fn queues(&self) -> Vec<Arc<dyn CloseQueue>> {
        let mut queues: Vec<Arc<dyn CloseQueue>> = vec![Arc::clone(&self.input) as Arc<dyn CloseQueue>];
        if let Some(output) = &self.output {
            queues.push(Arc::clone(&output.queue) as Arc<dyn CloseQueue>);
        }
        queues
    }

    fn summary(&self) -> StepSummary {
        StepSummary::from_counters(&self.name, self.num_workers(), &self.counters)
    }
}
