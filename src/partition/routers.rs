//! Partitioner implementations
//!
//! Each partitioner handles a specific routing strategy.

use super::types::{OutputPartitioner, WithStream};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

fn hash_to_partition<T: Hash + ?Sized>(value: &T, num_partitions: usize) -> usize {
    if num_partitions <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    (hasher.finish() % num_partitions as u64) as usize
}

// ============================================================================
// By Stream
// ============================================================================

/// Routes every event of a stream to the same partition
#[derive(Debug, Clone, Copy, Default)]
pub struct ByStreamPartitioner;

impl<K: WithStream> OutputPartitioner<K> for ByStreamPartitioner {
    fn partition(&self, key: &K, num_partitions: usize) -> usize {
        hash_to_partition(key.stream(), num_partitions)
    }
}

// ============================================================================
// By Key Hash
// ============================================================================

/// Routes by the hash of the whole key (e.g. stream plus primary key)
#[derive(Debug, Clone, Copy, Default)]
pub struct ByKeyHashPartitioner;

impl<K: Hash> OutputPartitioner<K> for ByKeyHashPartitioner {
    fn partition(&self, key: &K, num_partitions: usize) -> usize {
        hash_to_partition(key, num_partitions)
    }
}

// ============================================================================
// Round Robin
// ============================================================================

/// Spreads events evenly regardless of key
#[derive(Debug, Default)]
pub struct RoundRobinPartitioner {
    next: AtomicUsize,
}

impl RoundRobinPartitioner {
    /// Create a round robin partitioner starting at partition 0
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K> OutputPartitioner<K> for RoundRobinPartitioner {
    fn partition(&self, _key: &K, num_partitions: usize) -> usize {
        if num_partitions == 0 {
            return 0;
        }
        self.next.fetch_add(1, Ordering::Relaxed) % num_partitions
    }
}
