//! Batch accumulator contract
//!
//! A per-partition state machine that folds keyed inputs into batches:
//!
//! ```text
//! NotStarted --start--> Accumulating --accept--> NoOutput            (keep accumulating)
//!                                      \-------> IntermediateOutput  (flush, keep accumulating)
//!                                       \------> FinalOutput         (done, start again next time)
//! Accumulating --finish--> final output      (end of stream or shutdown)
//! ```

use super::types::WithBatchState;
use crate::error::Result;
use crate::partition::WithStream;
use async_trait::async_trait;
use std::hash::Hash;

/// Result of folding one input into an accumulator state
#[derive(Debug)]
pub enum BatchAccumulatorResult<S, O> {
    /// Nothing to flush; keep accumulating into the same state
    NoOutput(S),
    /// A partial result is ready; the same state keeps accumulating
    IntermediateOutput(S, O),
    /// The batch is complete; the state is discarded
    FinalOutput(O),
}

impl<S, O> BatchAccumulatorResult<S, O> {
    /// Output carried by this result, if any
    pub fn output(&self) -> Option<&O> {
        match self {
            Self::NoOutput(_) => None,
            Self::IntermediateOutput(_, output) | Self::FinalOutput(output) => Some(output),
        }
    }

    /// Whether the accumulation for this key is complete
    pub fn is_final(&self) -> bool {
        matches!(self, Self::FinalOutput(_))
    }
}

/// Folds a stream of keyed inputs into batches
///
/// State is owned by the single worker driving a partition and is never
/// shared. Errors are fatal to the sync: a failed batch may already be
/// partially applied to the destination, so there is no retry here.
#[async_trait]
pub trait BatchAccumulator: Send + Sync + 'static {
    /// Routing/accumulation key
    type Key: Clone + Eq + Hash + WithStream + Send + Sync + 'static;
    /// Input value
    type Input: Send + 'static;
    /// Per-key accumulation state
    type State: Send + 'static;
    /// Flushed result
    type Output: WithBatchState + Send + 'static;

    /// Open fresh state for `key` on worker `partition`
    async fn start(&self, key: &Self::Key, partition: usize) -> Result<Self::State>;

    /// Fold one input into `state`
    async fn accept(
        &self,
        input: Self::Input,
        state: Self::State,
    ) -> Result<BatchAccumulatorResult<Self::State, Self::Output>>;

    /// Force out whatever is buffered
    async fn finish(&self, state: Self::State) -> Result<Self::Output>;
}
