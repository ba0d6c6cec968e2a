//! Fixed set of independent bounded channels
//!
//! Each partition is its own tokio mpsc channel: a full partition suspends
//! only the producers pushing into it, and FIFO order holds per partition.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::debug;

/// Behaviour of `enqueue` once the queue has been closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueMode {
    /// Enqueue after close fails fast with `QueueClosed`
    #[default]
    Strict,
    /// Enqueue after close drops the item
    BestEffort,
}

/// Outcome of a non-blocking enqueue
#[derive(Debug, PartialEq, Eq)]
pub enum TryEnqueue<T> {
    /// The item was queued
    Enqueued,
    /// The partition is full; the item is handed back
    Full(T),
    /// The queue is closed and the item was dropped (best-effort mode)
    Dropped,
}

/// Type-erased close handle, so a pipeline can close queues of any item type
pub trait CloseQueue: Send + Sync {
    /// Close every partition
    fn close(&self);

    /// Close every partition and fail producers still waiting for a slot
    fn abort(&self);
}

/// Bounded multi-producer/multi-consumer queue split into partitions
#[derive(Debug)]
pub struct PartitionedQueue<T> {
    senders: Vec<Mutex<Option<mpsc::Sender<T>>>>,
    receivers: Vec<tokio::sync::Mutex<mpsc::Receiver<T>>>,
    slots_per_partition: usize,
    mode: EnqueueMode,
    closed: AtomicBool,
    aborted: AtomicBool,
    abort_signal: Notify,
}

impl<T: Send> PartitionedQueue<T> {
    /// Create `num_partitions` channels of `slots_per_partition` slots each
    pub fn new(
        num_partitions: usize,
        slots_per_partition: usize,
        mode: EnqueueMode,
    ) -> Result<Self> {
        if num_partitions == 0 {
            return Err(Error::invalid_value(
                "num_partitions",
                "must be greater than 0",
            ));
        }
        if slots_per_partition == 0 {
            return Err(Error::invalid_value(
                "slots_per_partition",
                "must be greater than 0",
            ));
        }

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..num_partitions)
            .map(|_| {
                let (tx, rx) = mpsc::channel(slots_per_partition);
                (Mutex::new(Some(tx)), tokio::sync::Mutex::new(rx))
            })
            .unzip();

        Ok(Self {
            senders,
            receivers,
            slots_per_partition,
            mode,
            closed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            abort_signal: Notify::new(),
        })
    }

    /// Number of partitions
    pub fn num_partitions(&self) -> usize {
        self.senders.len()
    }

    /// Slots per partition
    pub fn slots_per_partition(&self) -> usize {
        self.slots_per_partition
    }

    /// Enqueue mode
    pub fn mode(&self) -> EnqueueMode {
        self.mode
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_partition(&self, partition: usize) -> Result<()> {
        if partition >= self.num_partitions() {
            return Err(Error::PartitionOutOfRange {
                partition,
                num_partitions: self.num_partitions(),
            });
        }
        Ok(())
    }

    fn sender(&self, partition: usize) -> Result<Option<mpsc::Sender<T>>> {
        self.check_partition(partition)?;
        Ok(self.senders[partition]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn rejected(&self, partition: usize) -> Result<bool> {
        match self.mode {
            EnqueueMode::Strict => Err(Error::QueueClosed { partition }),
            EnqueueMode::BestEffort => {
                debug!(partition, "Dropping item enqueued after close");
                Ok(false)
            }
        }
    }

    /// Push `item` into `partition`, suspending while the partition is full
    ///
    /// Returns `Ok(true)` when queued. After `close`, strict queues return
    /// `QueueClosed` and best-effort queues return `Ok(false)`.
    pub async fn enqueue(&self, partition: usize, item: T) -> Result<bool> {
        let Some(sender) = self.sender(partition)? else {
            return self.rejected(partition);
        };
        tokio::select! {
            sent = sender.send(item) => match sent {
                Ok(()) => Ok(true),
                Err(_) => self.rejected(partition),
            },
            () = self.wait_aborted() => self.rejected(partition),
        }
    }

    async fn wait_aborted(&self) {
        let notified = self.abort_signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.aborted.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// Push without suspending
    pub fn try_enqueue(&self, partition: usize, item: T) -> Result<TryEnqueue<T>> {
        let Some(sender) = self.sender(partition)? else {
            return self.rejected(partition).map(|_| TryEnqueue::Dropped);
        };
        match sender.try_send(item) {
            Ok(()) => Ok(TryEnqueue::Enqueued),
            Err(TrySendError::Full(item)) => Ok(TryEnqueue::Full(item)),
            Err(TrySendError::Closed(_)) => self.rejected(partition).map(|_| TryEnqueue::Dropped),
        }
    }

    /// Pull the next item from `partition`
    ///
    /// Suspends until an item arrives. Returns `Ok(None)` once the queue is
    /// closed and the partition has been drained.
    pub async fn dequeue(&self, partition: usize) -> Result<Option<T>> {
        self.check_partition(partition)?;
        let mut receiver = self.receivers[partition].lock().await;
        Ok(receiver.recv().await)
    }

    /// Close every partition
    ///
    /// Items already queued are still delivered. Producers blocked on a full
    /// partition complete their send as consumers drain it.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for sender in &self.senders {
            sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        }
        debug!(partitions = self.num_partitions(), "Closed partitioned queue");
    }

    /// Close every partition and fail producers blocked on a full partition
    ///
    /// Used when consumers have stopped and will never drain the queue.
    pub fn abort(&self) {
        self.close();
        if !self.aborted.swap(true, Ordering::AcqRel) {
            self.abort_signal.notify_waiters();
        }
    }
}

impl<T: Send> CloseQueue for PartitionedQueue<T> {
    fn close(&self) {
        PartitionedQueue::close(self);
    }

    fn abort(&self) {
        PartitionedQueue::abort(self);
    }
}
