//! Memory reservations backing queue budgets

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct MemoryPool {
    total: u64,
    reserved: AtomicU64,
}

/// Hands out byte reservations against a fixed total
#[derive(Debug, Clone)]
pub struct MemoryManager {
    pool: Arc<MemoryPool>,
}

impl MemoryManager {
    /// Create a manager over `total_bytes`
    pub fn new(total_bytes: u64) -> Self {
        Self {
            pool: Arc::new(MemoryPool {
                total: total_bytes,
                reserved: AtomicU64::new(0),
            }),
        }
    }

    /// Reserve `bytes`, failing if the pool cannot satisfy the request
    pub fn reserve(&self, bytes: u64) -> Result<MemoryReservation> {
        let total = self.pool.total;
        self.pool
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(bytes).filter(|next| *next <= total)
            })
            .map_err(|current| Error::ResourceExhausted {
                requested: bytes,
                available: total.saturating_sub(current),
            })?;

        debug!(bytes, available = self.available(), "Reserved memory");
        Ok(MemoryReservation {
            bytes,
            pool: Arc::clone(&self.pool),
        })
    }

    /// Total bytes managed
    pub fn total(&self) -> u64 {
        self.pool.total
    }

    /// Bytes currently reserved
    pub fn reserved(&self) -> u64 {
        self.pool.reserved.load(Ordering::Acquire)
    }

    /// Bytes still available
    pub fn available(&self) -> u64 {
        self.pool.total.saturating_sub(self.reserved())
    }
}

/// A held reservation; the bytes return to the pool on drop
#[derive(Debug)]
pub struct MemoryReservation {
    bytes: u64,
    pool: Arc<MemoryPool>,
}

impl MemoryReservation {
    /// Reserved byte count
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.pool.reserved.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
