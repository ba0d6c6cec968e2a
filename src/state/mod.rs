//! Checkpoint state module
//!
//! Commits buffered stats when a checkpoint is cut and stamps them onto
//! the checkpoint message before it is acknowledged upstream.
//!
//! # Overview
//!
//! The state module provides:
//! - `CheckpointMessage` - stream and global checkpoint messages
//! - `StateStatsEnricher` - commits stats and writes them onto checkpoints
//! - `NamespaceMapper` - resolves a checkpoint's source stream to its destination stream
//! - `CheckpointLedger` - tells when the partitions a checkpoint names are persisted

mod enricher;
mod ledger;
mod mapper;
mod types;

pub use enricher::StateStatsEnricher;
pub use ledger::CheckpointLedger;
pub use mapper::{ConfiguredNamespaceMapper, IdentityMapper, NamespaceMapper};
pub use types::{
    Checkpoint, CheckpointMessage, CheckpointStats, CheckpointTotals, GlobalCheckpoint,
    StreamCheckpoint,
};
