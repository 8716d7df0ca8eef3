//! RAII scope timers.

use std::time::Instant;

use crate::label::LabelKey;
use crate::profiler::Profiler;

/// Measures the wall-clock time of a scope and reports it on drop.
///
/// Whether the profiler is enabled is checked only when the timer is
/// dropped: a timer started while enabled but dropped while disabled
/// reports nothing.
#[must_use = "the timer reports when dropped; bind it to a variable"]
pub struct ScopeTimer<'a> {
    profiler: Option<&'a Profiler>,
    label: LabelKey,
    start: Instant,
}

impl ScopeTimer<'static> {
    /// Time a scope against the global profiler.
    #[inline]
    pub fn new(label: &str) -> Self {
        Self {
            profiler: None,
            label: LabelKey::new(label),
            start: Instant::now(),
        }
    }
}

impl<'a> ScopeTimer<'a> {
    /// Time a scope against a specific profiler.
    #[inline]
    pub fn for_profiler(profiler: &'a Profiler, label: &str) -> Self {
        Self {
            profiler: Some(profiler),
            label: LabelKey::new(label),
            start: Instant::now(),
        }
    }

    /// Label this timer reports under.
    #[must_use]
    pub const fn label(&self) -> &LabelKey {
        &self.label
    }
}

impl Drop for ScopeTimer<'_> {
    #[inline]
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        match self.profiler {
            Some(profiler) => profiler.record_elapsed(self.label, elapsed),
            None => crate::context::record_elapsed(self.label, elapsed),
        }
    }
}
