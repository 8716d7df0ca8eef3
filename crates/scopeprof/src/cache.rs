//! Per-thread label resolution cache and sample throttle.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use arrayvec::ArrayVec;

use crate::label::LabelKey;
use crate::pool::AggregateHandle;

/// Entries per thread.
pub const CACHE_CAPACITY: usize = 32;

struct CacheEntry {
    label: LabelKey,
    handle: AggregateHandle,
    last_access: u64,
}

/// Bounded label → aggregate cache with approximate LRU eviction.
///
/// Owned by a single thread; no synchronization.
pub struct FastPathCache {
    entries: Vec<CacheEntry>,
    capacity: usize,
    tick: u64,
}

impl Default for FastPathCache {
    fn default() -> Self {
        Self::new(CACHE_CAPACITY)
    }
}

impl FastPathCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    /// Look up a label, refreshing its access time on a hit.
    pub fn find(&mut self, label: &LabelKey) -> Option<AggregateHandle> {
        self.tick += 1;
        let tick = self.tick;
        self.entries
            .iter_mut()
            .find(|entry| entry.label == *label)
            .map(|entry| {
                entry.last_access = tick;
                entry.handle.clone()
            })
    }

    /// Insert or replace a label, evicting the least recently used entry
    /// when full.
    pub fn insert(&mut self, label: LabelKey, handle: AggregateHandle) {
        self.tick += 1;
        let entry = CacheEntry {
            label,
            handle,
            last_access: self.tick,
        };

        if let Some(existing) = self.entries.iter_mut().find(|e| e.label == label) {
            *existing = entry;
        } else if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else if let Some(oldest) = self.entries.iter_mut().min_by_key(|e| e.last_access) {
            *oldest = entry;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Profilers a thread keeps caches for at once.
pub const PROFILER_SLOTS: usize = 4;

struct ProfilerSlot {
    profiler_id: u64,
    generation: u64,
    cache: FastPathCache,
}

/// Per-thread hot-path state: one label cache per recently used profiler and
/// a single sample throttle shared by all of them.
pub(crate) struct ThreadState {
    slots: ArrayVec<ProfilerSlot, PROFILER_SLOTS>,
    last_accepted: Option<Instant>,
}

impl ThreadState {
    fn new() -> Self {
        Self {
            slots: ArrayVec::new(),
            last_accepted: None,
        }
    }

    /// Accept at most one sample per `interval` on this thread, whichever
    /// profiler it is meant for.
    pub(crate) fn try_accept(&mut self, now: Instant, interval: Duration) -> bool {
        match self.last_accepted {
            Some(last) if now.saturating_duration_since(last) < interval => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }

    /// Label cache of `profiler_id`, emptied if it belongs to an older map
    /// generation. The least recently added profiler is evicted when full.
    pub(crate) fn cache_for(&mut self, profiler_id: u64, generation: u64) -> &mut FastPathCache {
        let index = if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.profiler_id == profiler_id)
        {
            index
        } else {
            if self.slots.is_full() {
                self.slots.pop_at(0);
            }
            self.slots.push(ProfilerSlot {
                profiler_id,
                generation,
                cache: FastPathCache::default(),
            });
            self.slots.len() - 1
        };

        let slot = &mut self.slots[index];
        if slot.generation != generation {
            slot.generation = generation;
            slot.cache.clear();
        }
        &mut slot.cache
    }
}

thread_local! {
    static THREAD_STATE: RefCell<ThreadState> = RefCell::new(ThreadState::new());
}

/// Run `f` with this thread's profiler state.
///
/// Returns `None` once the thread-local has been destroyed, e.g. when a
/// timer is dropped from another thread-local's destructor.
pub(crate) fn with_thread_state<R>(f: impl FnOnce(&mut ThreadState) -> R) -> Option<R> {
    THREAD_STATE
        .try_with(|state| state.try_borrow_mut().ok().map(|mut state| f(&mut state)))
        .ok()
        .flatten()
}
