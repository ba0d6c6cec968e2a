//! Partition routing module
//!
//! Supports: by stream, by key hash, round robin
//!
//! # Overview
//!
//! Partitioners decide which queue partition an event lands in. The same
//! pipeline may route one step by primary-key hash (to spread load) and the
//! next by stream (to gather a stream's batches in one place).

mod routers;
mod types;

pub use routers::{ByKeyHashPartitioner, ByStreamPartitioner, RoundRobinPartitioner};
pub use types::{OutputPartitioner, WithStream};
