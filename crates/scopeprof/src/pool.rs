//! Fixed slab of aggregates with heap fallback.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::aggregate::SampleAggregate;

/// Number of slab slots allocated up front.
pub const DEFAULT_SLAB_CAPACITY: usize = 256;

/// Shared storage cell for one aggregate.
pub type AggregateCell = Arc<Mutex<SampleAggregate>>;

/// Opaque handle to a pool-owned aggregate.
///
/// Slab handles carry their slot index so the pool can recycle them;
/// heap handles own their storage outright.
#[derive(Debug, Clone)]
pub enum AggregateHandle {
    Slab { index: usize, cell: AggregateCell },
    Heap { cell: AggregateCell },
}

impl AggregateHandle {
    /// Lock the aggregate for reading or updating.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, SampleAggregate> {
        match self {
            Self::Slab { cell, .. } | Self::Heap { cell } => cell.lock(),
        }
    }

    /// Whether the handle refers to a slab slot.
    #[must_use]
    pub const fn is_slab(&self) -> bool {
        matches!(self, Self::Slab { .. })
    }
}

struct Slab {
    cells: Vec<AggregateCell>,
    used: Vec<bool>,
    in_use: usize,
    heap_in_use: usize,
}

/// Allocator for [`SampleAggregate`] storage.
///
/// Slab bookkeeping sits behind its own lock, independent of the profiler's
/// label map lock.
pub struct AggregatePool {
    slab: Mutex<Slab>,
}

impl Default for AggregatePool {
    fn default() -> Self {
        Self::new(DEFAULT_SLAB_CAPACITY)
    }
}

impl AggregatePool {
    /// Create a pool with `capacity` preallocated slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cells = (0..capacity)
            .map(|_| Arc::new(Mutex::new(SampleAggregate::new())))
            .collect();
        Self {
            slab: Mutex::new(Slab {
                cells,
                used: vec![false; capacity],
                in_use: 0,
                heap_in_use: 0,
            }),
        }
    }

    /// Hand out an empty aggregate. Never fails.
    pub fn allocate(&self) -> AggregateHandle {
        let mut slab = self.slab.lock();

        if let Some(index) = slab.used.iter().position(|used| !used) {
            slab.used[index] = true;
            slab.in_use += 1;
            return AggregateHandle::Slab {
                index,
                cell: Arc::clone(&slab.cells[index]),
            };
        }

        slab.heap_in_use += 1;
        drop(slab);
        AggregateHandle::Heap {
            cell: Arc::new(Mutex::new(SampleAggregate::new())),
        }
    }

    /// Allocate and fill with a copy of `value`.
    pub fn allocate_with(&self, value: &SampleAggregate) -> AggregateHandle {
        let handle = self.allocate();
        handle.lock().clone_from(value);
        handle
    }

    /// Return an aggregate to the pool.
    ///
    /// The slot gets a fresh empty cell; other clones of the handle are
    /// detached from the pool.
    pub fn deallocate(&self, handle: AggregateHandle) {
        match handle {
            AggregateHandle::Slab { index, cell } => {
                let mut slab = self.slab.lock();
                // Only the live occupant of a slot may free it.
                let live = slab.used.get(index).copied().unwrap_or(false)
                    && Arc::ptr_eq(&slab.cells[index], &cell);
                if live {
                    // Outstanding clones keep writing into the detached cell,
                    // never into whichever label reuses the slot.
                    slab.cells[index] = Arc::new(Mutex::new(SampleAggregate::new()));
                    slab.used[index] = false;
                    slab.in_use -= 1;
                }
            }
            AggregateHandle::Heap { cell } => {
                let mut slab = self.slab.lock();
                slab.heap_in_use = slab.heap_in_use.saturating_sub(1);
                drop(slab);
                drop(cell);
            }
        }
    }

    /// Number of slab slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slab.lock().cells.len()
    }

    /// Slab slots currently handed out.
    #[must_use]
    pub fn slab_in_use(&self) -> usize {
        self.slab.lock().in_use
    }

    /// Heap-fallback aggregates currently handed out.
    #[must_use]
    pub fn heap_in_use(&self) -> usize {
        self.slab.lock().heap_in_use
    }
}
