//! Fixed-capacity table of open file handles
//!
//! Callers never see remote file handles directly; they get a small integer
//! [`HandleId`]. The table hands out the lowest free id, so ids are
//! deterministic and a closed id is the first to be reused.
//!
//! # Slot lifecycle
//!
//! ```text
//! Free --reserve--> Reserved --fill--> Open --release--> Free
//!                      |
//!                      +--cancel--> Free
//! ```
//!
//! `open` reserves an id before dispatching the blocking call so that
//! concurrent opens past capacity fail immediately. Lookups and releases only
//! ever see `Open` slots; a reserved id reads as "not found".

use crate::error::{BridgeError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifier of an open file, as exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u32);

impl HandleId {
    /// Wrap a raw id
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for HandleId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Slot<T> {
    Free,
    Reserved,
    Open(Arc<T>),
}

struct Slots<T> {
    /// Slots below the high-water mark; everything at or above it is free
    slots: Vec<Slot<T>>,
    /// Released indices below the high-water mark, smallest first
    free: BinaryHeap<Reverse<usize>>,
    open: usize,
}

/// Mapping from [`HandleId`] to open files with a fixed capacity
///
/// All operations take a short internal lock, so the table can be shared
/// between the caller's context and completion paths.
pub struct HandleTable<T> {
    capacity: usize,
    inner: Mutex<Slots<T>>,
}

impl<T> HandleTable<T> {
    /// Default number of slots
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create an empty table
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get().min(u32::MAX as usize);
        Self {
            capacity,
            inner: Mutex::new(Slots {
                slots: Vec::new(),
                free: BinaryHeap::new(),
                open: 0,
            }),
        }
    }

    /// Number of slots
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ids currently bound to an open file
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().open
    }

    /// Ids currently bound to an open file, in ascending order
    #[must_use]
    pub fn open_ids(&self) -> Vec<HandleId> {
        let guard = self.lock();
        guard
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Open(_)))
            .filter_map(|(index, _)| u32::try_from(index).ok().map(HandleId))
            .collect()
    }

    /// Claim the lowest free id without binding a file yet
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when every slot is reserved or open.
    pub fn reserve(&self) -> Result<HandleId> {
        let mut guard = self.lock();
        let index = if let Some(Reverse(index)) = guard.free.pop() {
            index
        } else if guard.slots.len() < self.capacity {
            guard.slots.push(Slot::Free);
            guard.slots.len() - 1
        } else {
            return Err(BridgeError::CapacityExceeded(self.capacity));
        };
        guard.slots[index] = Slot::Reserved;
        #[allow(clippy::cast_possible_truncation)] // capacity is clamped to u32::MAX
        Ok(HandleId(index as u32))
    }

    /// Claim the lowest free id, returning it to the pool unless committed
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when every slot is reserved or open.
    pub fn reserve_slot(&self) -> Result<Reservation<'_, T>> {
        let id = self.reserve()?;
        Ok(Reservation {
            table: self,
            id,
            committed: false,
        })
    }

    /// Bind a file to a reserved id
    ///
    /// Does nothing if `id` is not currently reserved.
    pub fn fill(&self, id: HandleId, file: Arc<T>) {
        let mut guard = self.lock();
        if let Some(slot) = guard.slots.get_mut(id.index()) {
            if matches!(slot, Slot::Reserved) {
                *slot = Slot::Open(file);
                guard.open += 1;
            }
        }
    }

    /// Return a reserved id to the free pool
    pub fn cancel(&self, id: HandleId) {
        let mut guard = self.lock();
        if let Some(slot) = guard.slots.get_mut(id.index()) {
            if matches!(slot, Slot::Reserved) {
                *slot = Slot::Free;
                guard.free.push(Reverse(id.index()));
            }
        }
    }

    /// Bind a file to the lowest free id
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the table is full.
    pub fn allocate(&self, file: Arc<T>) -> Result<HandleId> {
        let id = self.reserve()?;
        self.fill(id, file);
        Ok(id)
    }

    /// Find the file bound to `id`
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` for ids outside `[0, capacity)` and for ids
    /// that are free or only reserved.
    pub fn lookup(&self, id: HandleId) -> Result<Arc<T>> {
        match self.lock().slots.get(id.index()) {
            Some(Slot::Open(file)) => Ok(Arc::clone(file)),
            _ => Err(BridgeError::InvalidHandle(id)),
        }
    }

    /// Unbind `id`, returning the file it held
    ///
    /// Releasing a free, reserved or out-of-range id is a no-op.
    pub fn release(&self, id: HandleId) -> Option<Arc<T>> {
        let mut guard = self.lock();
        let slot = guard.slots.get_mut(id.index())?;
        if !matches!(slot, Slot::Open(_)) {
            return None;
        }
        let Slot::Open(file) = std::mem::replace(slot, Slot::Free) else {
            return None;
        };
        guard.open -= 1;
        guard.free.push(Reverse(id.index()));
        Some(file)
    }

    /// Unbind every open id, returning the files in id order
    ///
    /// Reserved ids are left alone so that in-flight opens can still settle.
    pub fn drain(&self) -> Vec<Arc<T>> {
        let mut guard = self.lock();
        let mut drained = Vec::new();
        let mut freed = Vec::new();
        for (index, slot) in guard.slots.iter_mut().enumerate() {
            if matches!(slot, Slot::Open(_)) {
                if let Slot::Open(file) = std::mem::replace(slot, Slot::Free) {
                    drained.push(file);
                    freed.push(index);
                }
            }
        }
        guard.open -= drained.len();
        guard.free.extend(freed.into_iter().map(Reverse));
        drained
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A reserved id held across an in-flight open
///
/// Dropping the reservation without [`Reservation::commit`] cancels it, so
/// every failure path (errors, worker panics, a dropped future) frees the slot.
pub struct Reservation<'a, T> {
    table: &'a HandleTable<T>,
    id: HandleId,
    committed: bool,
}

impl<T> Reservation<'_, T> {
    /// The reserved id
    #[must_use]
    pub const fn id(&self) -> HandleId {
        self.id
    }

    /// Bind `file` to the reserved id and hand the id out
    pub fn commit(mut self, file: Arc<T>) -> HandleId {
        self.committed = true;
        self.table.fill(self.id, file);
        self.id
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if !self.committed {
            self.table.cancel(self.id);
        }
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(Self::DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("capacity", &self.capacity)
            .field("open", &self.open_count())
            .finish()
    }
}
