//! Statistics tracking for dispatched requests
//!
//! This module provides lock-free atomic counters (`SharedStats`) owned by each
//! connection. Counters can be bumped from the caller's context and read from
//! anywhere without locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a connection's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Requests handed to a worker
    pub dispatched: u64,
    /// Dispatched requests that completed successfully
    pub completed: u64,
    /// Dispatched requests that completed with an error
    pub failed: u64,
    /// Dispatched requests whose worker has not returned yet
    pub in_flight: u64,
    /// Completion callbacks invoked
    pub callbacks_delivered: u64,
    /// Completion callbacks that panicked
    pub callback_panics: u64,
}

/// Statistics tracking with interior mutability via atomics
///
/// # Thread Safety
///
/// All methods are thread-safe and lock-free. Atomic operations use
/// `Ordering::Relaxed` since the counters are informational and never used to
/// synchronize other memory.
#[derive(Debug, Default)]
pub struct SharedStats {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    callbacks_delivered: AtomicU64,
    callback_panics: AtomicU64,
}

impl SharedStats {
    /// Create zeroed counters
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            callbacks_delivered: AtomicU64::new(0),
            callback_panics: AtomicU64::new(0),
        }
    }

    /// Record a request handed to a worker
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a worker returning from its blocking call
    pub fn record_worker_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record the translated outcome of a dispatched request
    pub fn record_outcome(&self, ok: bool) {
        if ok {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a completion callback invocation
    pub fn record_callback(&self, panicked: bool) {
        self.callbacks_delivered.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.callback_panics.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Requests whose worker has not finished yet
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Copy the current counter values
    #[must_use]
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            callbacks_delivered: self.callbacks_delivered.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }
}
