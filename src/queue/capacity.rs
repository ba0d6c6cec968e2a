//! Queue sizing against a memory reservation
//!
//! Capacity is computed once at pipeline start and never adjusted.

use crate::error::{Error, Result};
use serde::Serialize;

/// Derived sizing for a set of partitioned queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueCapacity {
    /// Per-message size assumed for buffering decisions
    pub clamped_message_size_bytes: u64,
    /// Bounded slots per partition channel
    pub slots_per_partition: usize,
    /// Whether the expected message size had to be shrunk to fit the budget
    pub message_size_was_clamped: bool,
}

impl QueueCapacity {
    /// Worst-case bytes buffered across `num_partitions` full channels
    pub fn max_buffered_bytes(&self, num_partitions: usize) -> u64 {
        num_partitions as u64 * self.slots_per_partition as u64 * self.clamped_message_size_bytes
    }
}

/// Computes queue depth and a message-size clamp from a byte budget
///
/// Every producer and consumer may hold one message in flight, so the
/// assumed message size is clamped to `reserved / (producers + consumers)`.
/// It is also clamped to `reserved / partitions` so that each partition gets
/// at least one slot. Slots are then chosen so that
/// `partitions * slots * clamped_size <= reserved`.
#[derive(Debug, Clone)]
pub struct QueueCapacityCalculator {
    /// Workers pushing into the queue
    pub num_producers: usize,
    /// Workers pulling from the queue
    pub num_consumers: usize,
    /// Independent channels
    pub num_partitions: usize,
    /// Byte budget reserved for the queue
    pub reserved_bytes: u64,
    /// Expected size of one message
    pub expected_message_size_bytes: u64,
    /// Optional upper bound on slots per partition
    pub max_slots_per_partition: Option<usize>,
}

impl QueueCapacityCalculator {
    /// Create a calculator
    pub fn new(
        num_producers: usize,
        num_consumers: usize,
        num_partitions: usize,
        reserved_bytes: u64,
        expected_message_size_bytes: u64,
    ) -> Self {
        Self {
            num_producers,
            num_consumers,
            num_partitions,
            reserved_bytes,
            expected_message_size_bytes,
            max_slots_per_partition: None,
        }
    }

    /// Cap the number of slots per partition
    #[must_use]
    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots_per_partition = Some(max_slots);
        self
    }

    /// Compute the capacity
    ///
    /// A clamped message size is not an error; callers log it and use the
    /// clamped value. A budget too small to give every worker and partition a
    /// single byte is a resource error.
    pub fn calculate(&self) -> Result<QueueCapacity> {
        for (field, value) in [
            ("num_producers", self.num_producers),
            ("num_consumers", self.num_consumers),
            ("num_partitions", self.num_partitions),
        ] {
            if value == 0 {
                return Err(Error::invalid_value(field, "must be greater than 0"));
            }
        }
        if self.expected_message_size_bytes == 0 {
            return Err(Error::invalid_value(
                "expected_message_size_bytes",
                "must be greater than 0",
            ));
        }

        let in_flight = (self.num_producers + self.num_consumers) as u64;
        let partitions = self.num_partitions as u64;
        let max_message_size =
            (self.reserved_bytes / in_flight).min(self.reserved_bytes / partitions);
        if max_message_size == 0 {
            return Err(Error::ResourceExhausted {
                requested: in_flight.max(partitions),
                available: self.reserved_bytes,
            });
        }

        let clamped = self.expected_message_size_bytes.min(max_message_size);
        let mut slots = (self.reserved_bytes / (partitions * clamped)) as usize;
        if let Some(max_slots) = self.max_slots_per_partition {
            slots = slots.min(max_slots.max(1));
        }

        Ok(QueueCapacity {
            clamped_message_size_bytes: clamped,
            slots_per_partition: slots,
            message_size_was_clamped: clamped < self.expected_message_size_bytes,
        })
    }
}
