//! Partitioned queue module
//!
//! Bounded channels that decouple pipeline steps while bounding the memory
//! buffered between them.
//!
//! # Overview
//!
//! The queue module provides:
//! - `PartitionedQueue` - one bounded FIFO channel per partition
//! - `QueueCapacityCalculator` - slot count and message-size clamp from a byte budget
//! - `MemoryManager` - the reservation provider the budget is taken from

mod capacity;
mod memory;
mod partitioned;

pub use capacity::{QueueCapacity, QueueCapacityCalculator};
pub use memory::{MemoryManager, MemoryReservation};
pub use partitioned::{CloseQueue, EnqueueMode, PartitionedQueue, TryEnqueue};
