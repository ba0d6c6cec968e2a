// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Load
//!
//! The destination side of a sync: a concurrent load pipeline that moves
//! records into a sink, and the checkpoint statistics engine that reports
//! how many records each checkpoint committed.
//!
//! ## Features
//!
//! - **Partitioned Queues**: bounded per-partition channels sized from a memory budget
//! - **Batch Accumulators**: per-partition state machines driving the sink in batches
//! - **Checkpoint Stats**: per-partition atomic counters, each partition taken whole at its checkpoint
//! - **Checkpoint Enrichment**: committed and cumulative totals stamped onto checkpoint messages
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_load::stats::{CommittedStatsStore, PartitionHistogram};
//! use solidafy_load::{PartitionKey, StateKey, StreamDescriptor};
//!
//! let store = CommittedStatsStore::new();
//! let users = StreamDescriptor::new(Some("public"), "users");
//!
//! let counts = PartitionHistogram::new().with("p1", 10.0);
//! let bytes = PartitionHistogram::new().with("p1", 100.0);
//! store.accept_stats(&users, &counts, &bytes);
//!
//! let result = store.commit_stats(&users, &StateKey::new(1, vec![PartitionKey::new("p1")]));
//! assert_eq!(result.committed_stats.count, 10);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Load Pipeline                          │
//! │  RecordDispatcher → PartitionedQueue → LoadPipelineStep → ...   │
//! └─────────────────────────────────────────────────────────────────┘
//!          │ live stats                           │ batch state updates
//! ┌────────┴──────────┬─────────────────┬─────────┴─────────────────┐
//! │ CommittedStats    │ AdditionalStats │ CheckpointLedger          │
//! │ live → committed  │ named metrics   │ dispatched vs persisted   │
//! │ → cumulative      │ drain on read   │                           │
//! └───────────────────┴────────┬────────┴───────────────────────────┘
//!                              │
//!                   StateStatsEnricher → checkpoint message
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Pipeline configuration
pub mod config;

/// Checkpoint statistics stores
pub mod stats;

/// Partitioned queues and memory budgeting
pub mod queue;

/// Output partitioners
pub mod partition;

/// Load pipeline steps and supervision
pub mod pipeline;

/// Sink-backed batch accumulation
pub mod loader;

/// Checkpoint messages and stats enrichment
pub mod state;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use pipeline::{BatchAccumulator, BatchAccumulatorResult, LoadPipeline, LoadPipelineStep};
pub use state::StateStatsEnricher;
pub use stats::CommittedStatsStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
