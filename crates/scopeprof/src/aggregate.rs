//! Per-label sample statistics.

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

/// Number of samples kept inline before the dynamic history is used.
pub const INLINE_SAMPLES: usize = 8;

/// Default cap of the dynamic sample history.
pub const DEFAULT_MAX_SAMPLES: usize = 1000;

/// Smoothing factor of the recent-duration moving average.
pub const EMA_ALPHA: f64 = 0.1;

/// Accumulated statistics for one label.
///
/// `total_ms` and `average_ms` cover every sample ever added, while
/// [`samples`](Self::samples) only holds the retained window.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleAggregate {
    calls: u64,
    min_ms: f64,
    max_ms: f64,
    total_ms: f64,
    average_ms: f64,
    recent_ms: f64,
    inline: ArrayVec<f64, INLINE_SAMPLES>,
    history: Vec<f64>,
    uses_history: bool,
}

impl Default for SampleAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleAggregate {
    /// Create an empty aggregate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            calls: 0,
            min_ms: f64::MAX,
            max_ms: f64::MIN,
            total_ms: 0.0,
            average_ms: 0.0,
            recent_ms: 0.0,
            inline: ArrayVec::new_const(),
            history: Vec::new(),
            uses_history: false,
        }
    }

    /// Reset to the empty state, keeping the history allocation.
    pub fn reset(&mut self) {
        self.calls = 0;
        self.min_ms = f64::MAX;
        self.max_ms = f64::MIN;
        self.total_ms = 0.0;
        self.average_ms = 0.0;
        self.recent_ms = 0.0;
        self.inline.clear();
        self.history.clear();
        self.uses_history = false;
    }

    /// Record one duration. `max_samples` caps the dynamic history.
    pub fn add_sample(&mut self, duration_ms: f64, max_samples: usize) {
        self.calls += 1;

        // The first sample seeds the average instead of decaying from zero.
        self.recent_ms = if self.calls == 1 {
            duration_ms
        } else {
            EMA_ALPHA.mul_add(duration_ms, (1.0 - EMA_ALPHA) * self.recent_ms)
        };

        self.retain(duration_ms, max_samples.max(1));

        self.min_ms = self.min_ms.min(duration_ms);
        self.max_ms = self.max_ms.max(duration_ms);
        self.total_ms += duration_ms;
        self.average_ms = self.total_ms / self.calls as f64;
    }

    fn retain(&mut self, duration_ms: f64, cap: usize) {
        if !self.uses_history {
            if self.inline.try_push(duration_ms).is_ok() {
                return;
            }
            self.history.reserve(INLINE_SAMPLES + 1);
            self.history.extend(self.inline.drain(..));
            self.uses_history = true;
        }

        if self.history.len() >= cap {
            let excess = self.history.len() + 1 - cap;
            if excess == 1 {
                self.history.rotate_left(1);
                if let Some(last) = self.history.last_mut() {
                    *last = duration_ms;
                }
                return;
            }
            // The cap was lowered below the current length.
            self.history.drain(..excess);
        }
        self.history.push(duration_ms);
    }

    /// Number of recorded samples.
    #[must_use]
    pub const fn calls(&self) -> u64 {
        self.calls
    }

    /// Smallest recorded duration, or 0 when empty.
    #[must_use]
    pub fn min_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.min_ms
        }
    }

    /// Largest recorded duration, or 0 when empty.
    #[must_use]
    pub fn max_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.max_ms
        }
    }

    #[must_use]
    pub const fn total_ms(&self) -> f64 {
        self.total_ms
    }

    /// All-time average (`total / calls`).
    #[must_use]
    pub const fn average_ms(&self) -> f64 {
        self.average_ms
    }

    /// Exponential moving average of recent durations.
    #[must_use]
    pub const fn recent_ms(&self) -> f64 {
        self.recent_ms
    }

    /// Retained samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        if self.uses_history {
            &self.history
        } else {
            &self.inline
        }
    }

    /// Whether samples have moved from the inline buffer to the history.
    #[must_use]
    pub const fn uses_history(&self) -> bool {
        self.uses_history
    }

    /// Copy the statistics out.
    #[must_use]
    pub fn stats(&self) -> AggregateStats {
        AggregateStats {
            calls: self.calls,
            min_ms: self.min_ms(),
            max_ms: self.max_ms(),
            total_ms: self.total_ms,
            average_ms: self.average_ms,
            recent_ms: self.recent_ms,
        }
    }
}

/// Plain copy of an aggregate's statistics, without the sample history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub calls: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub total_ms: f64,
    pub average_ms: f64,
    pub recent_ms: f64,
}
