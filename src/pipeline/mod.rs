//! Load pipeline module
//!
//! Moves records from the source reader to the destination through a chain
//! of steps connected by partitioned queues.
//!
//! # Overview
//!
//! The pipeline module provides:
//! - `BatchAccumulator` - per-partition state machine folding inputs into batches
//! - `LoadPipelineStep` - runs one accumulator with a worker per input partition
//! - `LoadPipeline` - starts every step's workers and supervises them
//! - `RecordDispatcher` - entry point that routes source records into the first step
//!
//! ```text
//! reader ─► RecordDispatcher ─► [queue] ─► step 1 ─► [queue] ─► step 2 ─► batch state updates
//!              │                                                                │
//!              └──── live stats                          checkpoint ledger ◄────┘
//! ```
//!
//! Shutdown runs front to back: closing the dispatcher closes the first
//! queue, each step finishes its open batches once its input drains, and
//! the last worker of a step closes the next queue. A failing worker stops
//! the whole pipeline.

mod accumulator;
mod dispatcher;
mod step;
mod types;

pub use accumulator::{BatchAccumulator, BatchAccumulatorResult};
pub use dispatcher::RecordDispatcher;
pub use step::{LoadPipelineStep, StepQueue};
pub use types::{
    BatchState, BatchStateUpdate, CheckpointCounts, PipelineEvent, PipelineMessage,
    PipelineSummary, StepSummary, WithBatchState,
};

use crate::error::{Error, Result};
use crate::queue::CloseQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Shared run state of a pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    shutting_down: Arc<AtomicBool>,
}

impl PipelineContext {
    /// Create a context for a new run
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pipeline is being torn down after a failure
    ///
    /// A closed queue is only an error while this is false.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Returns true for the first caller only
    fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::AcqRel)
    }
}

/// A runnable stage of the pipeline
pub trait PipelineStep: Send + Sync {
    /// Step name, used in logs and errors
    fn name(&self) -> &str;

    /// Number of workers the step runs
    fn num_workers(&self) -> usize;

    /// Spawn the step's workers onto `tasks`
    fn spawn(self: Arc<Self>, context: &PipelineContext, tasks: &mut JoinSet<Result<()>>);

    /// Queues the step reads from or writes to
    fn queues(&self) -> Vec<Arc<dyn CloseQueue>>;

    /// Statistics gathered so far
    fn summary(&self) -> StepSummary;
}

/// Ordered chain of steps
#[derive(Default)]
pub struct LoadPipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl LoadPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    #[must_use]
    pub fn with_step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the pipeline has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Spawn every step's workers
    pub fn start(self) -> Result<RunningPipeline> {
        if self.steps.is_empty() {
            return Err(Error::config("pipeline has no steps"));
        }

        let context = PipelineContext::new();
        let mut tasks = JoinSet::new();
        for step in &self.steps {
            debug!(step = step.name(), workers = step.num_workers(), "Starting step");
            Arc::clone(step).spawn(&context, &mut tasks);
        }
        info!(
            steps = self.steps.len(),
            workers = tasks.len(),
            "Load pipeline started"
        );

        Ok(RunningPipeline {
            tasks,
            steps: self.steps,
            context,
            started: Instant::now(),
        })
    }
}

/// Handle to a started pipeline
pub struct RunningPipeline {
    tasks: JoinSet<Result<()>>,
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
    started: Instant,
}

impl RunningPipeline {
    /// The run's shared context
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    fn shutdown(&mut self) {
        if self.context.begin_shutdown() {
            for step in &self.steps {
                for queue in step.queues() {
                    queue.abort();
                }
            }
        }
        self.tasks.abort_all();
    }

    /// Wait for every worker to stop
    ///
    /// Returns the first worker failure. Any failure closes every queue and
    /// cancels the remaining workers.
    pub async fn join(mut self) -> Result<PipelineSummary> {
        let mut failure: Option<Error> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(err) if err.is_cancelled() && failure.is_some() => continue,
                Err(err) => Err(Error::Worker {
                    message: err.to_string(),
                }),
            };

            if let Err(err) = result {
                if failure.is_none() {
                    error!(error = %err, "Pipeline worker failed, shutting down");
                    self.shutdown();
                    failure = Some(err);
                } else {
                    debug!(error = %err, "Further worker failure during shutdown");
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let summary = PipelineSummary {
            steps: self.steps.iter().map(|step| step.summary()).collect(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        };
        info!(
            steps = summary.steps.len(),
            duration_ms = summary.duration_ms,
            "Load pipeline finished"
        );
        Ok(summary)
    }
}
