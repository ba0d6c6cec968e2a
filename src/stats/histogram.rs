//! Concurrent per-partition accumulators
//!
//! Each key has an atomic `f64` adder behind a shared read lock, so
//! increments to different keys never contend on a mutex; inserting or
//! removing a key takes the lock exclusively. Values are reported as whole
//! numbers at read time. Record and byte counts are non-negative
//! integers added in bounded batches, so the summation error stays far below
//! one and rounding never loses a whole increment.

use crate::types::{EmissionStats, PartitionKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Round an accumulated value to the integer that is reported upstream
pub(crate) fn to_whole(value: f64) -> i64 {
    value.round() as i64
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Float Adder
// ============================================================================

/// `f64` stored as raw bits, updated with a CAS loop
#[derive(Debug, Default)]
struct FloatAdder(AtomicU64);

impl FloatAdder {
    fn add(&self, amount: f64) {
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + amount).to_bits())
            });
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

// ============================================================================
// Partition Histogram
// ============================================================================

/// Mapping `PartitionKey -> accumulated value`, safe for concurrent increments
///
/// `increment` holds the map's shared lock for the duration of the atomic add,
/// so `remove` (exclusive lock) observes every increment that started before
/// it and none that start after it.
#[derive(Debug, Default)]
pub struct PartitionHistogram {
    cells: RwLock<HashMap<PartitionKey, FloatAdder>>,
}

impl PartitionHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to the value for `key`
    pub fn increment(&self, key: &PartitionKey, amount: f64) {
        {
            let cells = read(&self.cells);
            if let Some(cell) = cells.get(key) {
                cell.add(amount);
                return;
            }
        }
        let mut cells = write(&self.cells);
        cells.entry(key.clone()).or_default().add(amount);
    }

    /// Builder-style increment, handy for assembling histograms to accept
    #[must_use]
    pub fn with(self, key: impl Into<PartitionKey>, amount: f64) -> Self {
        self.increment(&key.into(), amount);
        self
    }

    /// Current value for `key` (zero if absent)
    pub fn get(&self, key: &PartitionKey) -> f64 {
        read(&self.cells).get(key).map_or(0.0, FloatAdder::load)
    }

    /// Current value for `key` rounded to a whole number
    pub fn get_whole(&self, key: &PartitionKey) -> i64 {
        to_whole(self.get(key))
    }

    /// Atomically take the value for `key` and drop the entry
    pub fn remove(&self, key: &PartitionKey) -> Option<f64> {
        write(&self.cells).remove(key).map(|cell| cell.load())
    }

    /// Field-wise sum with another histogram
    #[must_use]
    pub fn merge(&self, other: &PartitionHistogram) -> PartitionHistogram {
        let merged = PartitionHistogram::new();
        for (key, value) in self.snapshot().into_iter().chain(other.snapshot()) {
            merged.increment(&key, value);
        }
        merged
    }

    /// Plain copy of the current values
    pub fn snapshot(&self) -> HashMap<PartitionKey, f64> {
        read(&self.cells)
            .iter()
            .map(|(key, cell)| (key.clone(), cell.load()))
            .collect()
    }

    /// Keys currently present
    pub fn keys(&self) -> Vec<PartitionKey> {
        read(&self.cells).keys().cloned().collect()
    }

    /// Sum over every key
    pub fn total(&self) -> f64 {
        read(&self.cells).values().map(FloatAdder::load).sum()
    }

    /// Number of keys present
    pub fn len(&self) -> usize {
        read(&self.cells).len()
    }

    /// Whether no key is present
    pub fn is_empty(&self) -> bool {
        read(&self.cells).is_empty()
    }
}

impl Clone for PartitionHistogram {
    fn clone(&self) -> Self {
        self.snapshot().into_iter().collect()
    }
}

impl FromIterator<(PartitionKey, f64)> for PartitionHistogram {
    fn from_iter<I: IntoIterator<Item = (PartitionKey, f64)>>(iter: I) -> Self {
        let histogram = PartitionHistogram::new();
        for (key, value) in iter {
            histogram.increment(&key, value);
        }
        histogram
    }
}

// ============================================================================
// Partition Stats
// ============================================================================

/// Record counts and byte counts per partition
///
/// The pair is guarded so that removing a partition takes its count and its
/// bytes in one step: a concurrent `accept` lands wholly before or wholly
/// after the removal.
#[derive(Debug, Default)]
pub struct PartitionStats {
    /// Records per partition
    pub counts: PartitionHistogram,
    /// Bytes per partition
    pub bytes: PartitionHistogram,
    gate: RwLock<()>,
}

impl PartitionStats {
    /// Create empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Build stats from existing histograms
    pub fn from_histograms(counts: PartitionHistogram, bytes: PartitionHistogram) -> Self {
        Self {
            counts,
            bytes,
            gate: RwLock::new(()),
        }
    }

    /// Add one partition's contribution
    pub fn increment(&self, key: &PartitionKey, count: f64, bytes: f64) {
        let _gate = read(&self.gate);
        self.counts.increment(key, count);
        self.bytes.increment(key, bytes);
    }

    /// Add every value of the given histograms
    pub fn accept(&self, counts: &PartitionHistogram, bytes: &PartitionHistogram) {
        let _gate = read(&self.gate);
        for (key, value) in counts.snapshot() {
            self.counts.increment(&key, value);
        }
        for (key, value) in bytes.snapshot() {
            self.bytes.increment(&key, value);
        }
    }

    /// Take one partition's count and bytes together (zero if absent)
    pub fn remove(&self, key: &PartitionKey) -> EmissionStats {
        let _gate = write(&self.gate);
        let count = self.counts.remove(key).unwrap_or(0.0);
        let bytes = self.bytes.remove(key).unwrap_or(0.0);
        EmissionStats::new(to_whole(count), to_whole(bytes))
    }

    /// Read one partition without removing it
    pub fn get(&self, key: &PartitionKey) -> EmissionStats {
        let _gate = read(&self.gate);
        EmissionStats::new(self.counts.get_whole(key), self.bytes.get_whole(key))
    }

    /// Sum over every partition
    pub fn total(&self) -> EmissionStats {
        let _gate = read(&self.gate);
        EmissionStats::new(to_whole(self.counts.total()), to_whole(self.bytes.total()))
    }

    /// Field-wise merge
    #[must_use]
    pub fn merge(&self, other: &PartitionStats) -> PartitionStats {
        PartitionStats::from_histograms(
            self.counts.merge(&other.counts),
            self.bytes.merge(&other.bytes),
        )
    }
}

impl Clone for PartitionStats {
    fn clone(&self) -> Self {
        let _gate = read(&self.gate);
        PartitionStats::from_histograms(self.counts.clone(), self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(name: &str) -> PartitionKey {
        PartitionKey::from(name)
    }

    #[test]
    fn test_get_absent_is_zero() {
        let histogram = PartitionHistogram::new();
        assert_eq!(histogram.get(&key("missing")), 0.0);
        assert!(histogram.is_empty());
    }

    #[test]
    fn test_increment_and_remove() {
        let histogram = PartitionHistogram::new();
        histogram.increment(&key("p1"), 10.0);
        histogram.increment(&key("p1"), 5.0);
        histogram.increment(&key("p2"), 1.0);

        assert_eq!(histogram.get_whole(&key("p1")), 15);
        assert_eq!(histogram.len(), 2);

        assert_eq!(histogram.remove(&key("p1")), Some(15.0));
        assert_eq!(histogram.remove(&key("p1")), None);
        assert_eq!(histogram.get(&key("p1")), 0.0);
        assert_eq!(histogram.get_whole(&key("p2")), 1);
    }

    #[test]
    fn test_merge_sums_per_key() {
        let a = PartitionHistogram::new().with("p1", 1.0).with("p2", 2.0);
        let b = PartitionHistogram::new().with("p2", 3.0).with("p3", 4.0);

        let merged = a.merge(&b);
        assert_eq!(merged.get(&key("p1")), 1.0);
        assert_eq!(merged.get(&key("p2")), 5.0);
        assert_eq!(merged.get(&key("p3")), 4.0);
        // inputs untouched
        assert_eq!(a.get(&key("p2")), 2.0);
    }

    #[test]
    fn test_fractional_increments_round_at_read() {
        let histogram = PartitionHistogram::new();
        for _ in 0..10 {
            histogram.increment(&key("p1"), 0.1);
        }
        assert_eq!(histogram.get_whole(&key("p1")), 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let histogram = Arc::new(PartitionHistogram::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let histogram = Arc::clone(&histogram);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        histogram.increment(&key("hot"), 1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(histogram.get_whole(&key("hot")), 8000);
    }

    #[test]
    fn test_partition_stats_remove_takes_pair() {
        let stats = PartitionStats::new();
        stats.increment(&key("p1"), 3.0, 30.0);
        stats.increment(&key("p2"), 1.0, 10.0);

        assert_eq!(stats.total(), EmissionStats::new(4, 40));
        assert_eq!(stats.remove(&key("p1")), EmissionStats::new(3, 30));
        assert_eq!(stats.remove(&key("p1")), EmissionStats::zero());
        assert_eq!(stats.get(&key("p2")), EmissionStats::new(1, 10));
    }

    #[test]
    fn test_partition_stats_merge() {
        let a = PartitionStats::new();
        a.increment(&key("p1"), 1.0, 10.0);
        let b = PartitionStats::new();
        b.increment(&key("p1"), 2.0, 20.0);

        let merged = a.merge(&b);
        assert_eq!(merged.get(&key("p1")), EmissionStats::new(3, 30));
    }
}
