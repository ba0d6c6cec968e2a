//! Sink loader module
//!
//! Adapts an opaque destination write operation to the pipeline's
//! `BatchAccumulator` contract.
//!
//! # Overview
//!
//! The loader module provides:
//! - `BatchLoader` - the destination write operation
//! - `SinkBatchAccumulator` - count/size thresholded batching over a `BatchLoader`
//! - `LoadRecord` / `LoadedBatch` - input and output of the load step

mod sink;
mod types;

pub use sink::{BatchLoader, SinkBatchAccumulator};
pub use types::{LoadRecord, LoadedBatch, SinkBatch};

#[cfg(test)]
mod tests;
