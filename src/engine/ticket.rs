//! Admission control for in-flight downloads.
//!
//! A thin wrapper around [`tokio::sync::Semaphore`] that also counts how many
//! tickets are held right now and the most that were ever held at once. The
//! counters are what the stress tests assert the concurrency ceiling against.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Bounded pool of admission tickets shared by every download task of a round.
#[derive(Debug)]
pub struct TicketPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// One held concurrency slot. Dropping it hands the slot back.
#[derive(Debug)]
pub struct Ticket {
    pool: Arc<TicketPool>,
    _permit: OwnedSemaphorePermit,
}

impl TicketPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Waits for a free slot. There is no timeout; only closing the pool
    /// makes this fail.
    pub async fn acquire(self: &Arc<Self>) -> Result<Ticket, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Ticket {
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Wakes every waiter with an error. Tickets already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}
