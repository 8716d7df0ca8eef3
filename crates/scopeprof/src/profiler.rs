//! Label-keyed profiler service.

use std::collections::HashMap as StdHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::aggregate::{AggregateStats, SampleAggregate};
use crate::cache;
use crate::config::{OutputFormat, ProfilerConfig};
use crate::label::LabelKey;
use crate::pool::{AggregateHandle, AggregatePool, DEFAULT_SLAB_CAPACITY};
use crate::report::{
    now_millis, FrameRecord, FrameReport, ProfileEntry, ProfileReport, ReportWriter,
};
use crate::timer::ScopeTimer;

/// Upper bound for [`Profiler::profile_frames`].
pub const MAX_PROFILED_FRAMES: u32 = 1000;

/// Session name used before `begin_session` is called.
pub const DEFAULT_SESSION_NAME: &str = "Profile";

/// Session name used while profiling frames.
pub const FRAME_SESSION_NAME: &str = "Frame Profile";

static NEXT_PROFILER_ID: AtomicU64 = AtomicU64::new(1);

/// A named profiling context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(name: &str, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            enabled,
            created_at: Utc::now(),
        }
    }
}

/// State carried through a frame-profiling excursion.
struct FrameCapture {
    /// Value copy of the live statistics taken on entry.
    preserved: Vec<(LabelKey, SampleAggregate)>,
    previous_session: String,
    target_frames: u32,
    current_frame: u32,
    records: Vec<FrameRecord>,
    last_frame: Instant,
}

enum Mode {
    Normal,
    FrameProfiling(Box<FrameCapture>),
}

struct State {
    session: Session,
    mode: Mode,
    labels: HashMap<LabelKey, AggregateHandle>,
    config: ProfilerConfig,
}

/// Configuration read by `write_profile` without taking the state lock.
struct HotConfig {
    sample_interval_us: AtomicU64,
    auto_save_us: AtomicU64,
    max_samples: AtomicUsize,
    batch_size: AtomicUsize,
    structured: AtomicBool,
}

impl HotConfig {
    fn new(config: &ProfilerConfig) -> Self {
        Self {
            sample_interval_us: AtomicU64::new(micros(config.sample_interval)),
            auto_save_us: AtomicU64::new(micros(config.auto_save_interval)),
            max_samples: AtomicUsize::new(config.max_samples),
            batch_size: AtomicUsize::new(config.batch_size),
            structured: AtomicBool::new(config.output_format == OutputFormat::StructuredFile),
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// A report write prepared under the state lock and performed after it.
struct PendingWrite {
    path: PathBuf,
    report: ProfileReport,
}

/// Thread-safe profiler collecting per-label timing statistics.
///
/// Construct one explicitly to pass around as a context object, or use the
/// process-wide instance through [`crate::init`] and the free functions.
pub struct Profiler {
    id: u64,
    enabled: AtomicBool,
    high_precision: AtomicBool,
    hot: HotConfig,
    /// Bumped under the state write lock whenever the label map is rebuilt;
    /// thread caches from an older generation are discarded.
    generation: AtomicU64,
    state: RwLock<State>,
    pool: AggregatePool,
    writer: ReportWriter,
    unsaved: AtomicBool,
    /// Samples recorded since the last report write.
    pending_samples: AtomicUsize,
    epoch: Instant,
    /// Microseconds since `epoch` of the last periodic write.
    last_save_us: AtomicU64,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(ProfilerConfig::default())
    }
}

impl Profiler {
    /// Create a profiler with the given configuration.
    #[must_use]
    pub fn new(config: ProfilerConfig) -> Self {
        Self::with_slab_capacity(config, DEFAULT_SLAB_CAPACITY)
    }

    /// Create a profiler whose aggregate pool preallocates `slab_capacity` slots.
    #[must_use]
    pub fn with_slab_capacity(config: ProfilerConfig, slab_capacity: usize) -> Self {
        Self {
            id: NEXT_PROFILER_ID.fetch_add(1, Ordering::Relaxed),
            enabled: AtomicBool::new(config.enabled),
            high_precision: AtomicBool::new(config.high_precision),
            hot: HotConfig::new(&config),
            generation: AtomicU64::new(0),
            state: RwLock::new(State {
                session: Session::new(DEFAULT_SESSION_NAME, config.enabled),
                mode: Mode::Normal,
                labels: HashMap::new(),
                config,
            }),
            pool: AggregatePool::new(slab_capacity),
            writer: ReportWriter::new(),
            unsaved: AtomicBool::new(false),
            pending_samples: AtomicUsize::new(0),
            epoch: Instant::now(),
            last_save_us: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Start a new session, replacing the current one.
    ///
    /// Existing statistics are kept. In structured-file mode an initial
    /// report without profiles is written.
    pub fn begin_session(&self, name: &str) {
        let pending = {
            let mut state = self.state.write();
            self.start_session(&mut state, name)
        };
        tracing::info!("Profiling session '{}' started", name);
        self.perform(pending);
    }

    fn start_session(&self, state: &mut State, name: &str) -> Option<PendingWrite> {
        state.session = Session::new(name, self.is_enabled());
        self.unsaved.store(true, Ordering::Release);

        match state.config.output_format {
            OutputFormat::StructuredFile => Some(PendingWrite {
                path: state.config.output_path.clone(),
                report: ProfileReport::empty(name),
            }),
            OutputFormat::Console => None,
        }
    }

    /// Emit the final report for the current session.
    ///
    /// Does nothing while disabled or profiling frames. Returns the emitted
    /// report otherwise.
    pub fn end_session(&self) -> Option<ProfileReport> {
        if !self.is_enabled() {
            return None;
        }

        let (report, format, path, precision) = {
            let state = self.state.read();
            if matches!(state.mode, Mode::FrameProfiling(_)) {
                tracing::debug!("end_session ignored while profiling frames");
                return None;
            }
            (
                Self::build_report(&state),
                state.config.output_format,
                state.config.output_path.clone(),
                state.config.precision,
            )
        };

        match format {
            OutputFormat::Console => {
                self.writer.print_console(&report, precision);
                self.unsaved.store(false, Ordering::Release);
            }
            OutputFormat::StructuredFile => {
                if self.persist_profile(&path, &report) {
                    self.unsaved.store(false, Ordering::Release);
                    tracing::info!(
                        "Profile for session '{}' written to {}",
                        report.session,
                        path.display()
                    );
                }
            }
        }
        Some(report)
    }

    /// Copy of the current session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.state.read().session.clone()
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Record a duration in milliseconds under `label`.
    ///
    /// Silently ignored when disabled, when the label is empty, or when this
    /// thread already had a sample accepted within the sample interval.
    #[inline]
    pub fn write_profile(&self, label: &str, duration_ms: f64) {
        if !self.is_enabled() || label.is_empty() {
            return;
        }
        self.record(LabelKey::new(label), duration_ms);
    }

    /// Record an elapsed duration, honoring the high-precision setting.
    pub fn record_elapsed(&self, label: LabelKey, elapsed: Duration) {
        if !self.is_enabled() || label.is_empty() {
            return;
        }
        let duration_ms = if self.is_high_precision() {
            elapsed.as_secs_f64() * 1000.0
        } else {
            elapsed.as_millis() as f64
        };
        self.record(label, duration_ms);
    }

    fn record(&self, key: LabelKey, duration_ms: f64) {
        let now = Instant::now();
        let interval = Duration::from_micros(self.hot.sample_interval_us.load(Ordering::Relaxed));
        let generation = self.generation.load(Ordering::Acquire);

        let cached = cache::with_thread_state(|thread| {
            if !thread.try_accept(now, interval) {
                return None;
            }
            Some(thread.cache_for(self.id, generation).find(&key))
        });

        // Throttled, or this thread's locals are already torn down.
        let Some(cached) = cached.flatten() else {
            return;
        };

        let max_samples = self.hot.max_samples.load(Ordering::Relaxed);
        match cached {
            Some(handle) => handle.lock().add_sample(duration_ms, max_samples),
            None => self.resolve_and_record(key, duration_ms, max_samples),
        }

        self.unsaved.store(true, Ordering::Release);
        let pending = self.pending_samples.fetch_add(1, Ordering::AcqRel) + 1;
        self.maybe_autosave(pending);
    }

    /// Cache miss: shared map lookup, then insertion under the exclusive lock.
    fn resolve_and_record(&self, key: LabelKey, duration_ms: f64, max_samples: usize) {
        let shared = {
            let state = self.state.read();
            state
                .labels
                .get(&key)
                .cloned()
                .map(|handle| (handle, self.generation.load(Ordering::Acquire)))
        };

        let (handle, generation) = match shared {
            Some(found) => found,
            None => {
                let mut state = self.state.write();
                let handle = state
                    .labels
                    .entry(key)
                    .or_insert_with(|| self.pool.allocate())
                    .clone();
                (handle, self.generation.load(Ordering::Acquire))
            }
        };

        handle.lock().add_sample(duration_ms, max_samples);
        cache::with_thread_state(|thread| thread.cache_for(self.id, generation).insert(key, handle));
    }

    fn maybe_autosave(&self, pending: usize) {
        let now_us = micros(self.epoch.elapsed());
        let last_us = self.last_save_us.load(Ordering::Acquire);
        let interval_us = self.hot.auto_save_us.load(Ordering::Relaxed);
        let batch_size = self.hot.batch_size.load(Ordering::Relaxed);

        let due = now_us.saturating_sub(last_us) >= interval_us
            || (batch_size > 0 && pending >= batch_size);
        if !due {
            return;
        }

        // One thread wins the periodic write.
        if self
            .last_save_us
            .compare_exchange(last_us, now_us, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        self.pending_samples.store(0, Ordering::Release);
        if self.hot.structured.load(Ordering::Relaxed) {
            tracing::debug!(pending, "Periodic profile write");
            self.flush();
        }
    }

    /// Write the current report now if there is unsaved data.
    ///
    /// Only applies to the structured-file format; returns whether a report
    /// was written.
    pub fn flush(&self) -> bool {
        if !self.unsaved.load(Ordering::Acquire) {
            return false;
        }

        let (report, path) = {
            let state = self.state.read();
            if state.config.output_format != OutputFormat::StructuredFile {
                return false;
            }
            (Self::build_report(&state), state.config.output_path.clone())
        };

        let written = self.persist_profile(&path, &report);
        if written {
            self.unsaved.store(false, Ordering::Release);
        }
        written
    }

    /// Whether samples were recorded since the last report write.
    #[must_use]
    pub fn has_unsaved_data(&self) -> bool {
        self.unsaved.load(Ordering::Acquire)
    }

    /// Start a scope timer bound to this profiler.
    #[must_use]
    pub fn scope(&self, label: &str) -> ScopeTimer<'_> {
        ScopeTimer::for_profiler(self, label)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Snapshot of every label's retained samples.
    #[must_use]
    pub fn get_profiles(&self) -> StdHashMap<String, Vec<f64>> {
        let state = self.state.read();
        state
            .labels
            .iter()
            .map(|(label, handle)| (label.to_string(), handle.lock().samples().to_vec()))
            .collect()
    }

    /// Statistics of one label, if it has been recorded.
    #[must_use]
    pub fn stats(&self, label: &str) -> Option<AggregateStats> {
        let state = self.state.read();
        state
            .labels
            .get(&LabelKey::new(label))
            .map(|handle| handle.lock().stats())
    }

    /// Snapshot report of every label with at least one call.
    #[must_use]
    pub fn report(&self) -> ProfileReport {
        Self::build_report(&self.state.read())
    }

    fn build_report(state: &State) -> ProfileReport {
        let precision = state.config.precision;
        let mut profiles: Vec<ProfileEntry> = state
            .labels
            .iter()
            .filter_map(|(label, handle)| {
                let aggregate = handle.lock();
                (aggregate.calls() > 0)
                    .then(|| ProfileEntry::from_aggregate(label, &aggregate, precision))
            })
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));

        let frame_data = match &state.mode {
            Mode::FrameProfiling(capture) => Some(capture.records.clone()),
            Mode::Normal => None,
        };

        ProfileReport {
            session: state.session.name.clone(),
            timestamp: now_millis().to_string(),
            profiles,
            frame_data,
        }
    }

    /// Drop all live statistics, returning their storage to the pool.
    pub fn clear_profiles(&self) {
        let mut state = self.state.write();
        self.release_labels(&mut state);
    }

    fn release_labels(&self, state: &mut State) {
        for (_, handle) in state.labels.drain() {
            self.pool.deallocate(handle);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Aggregate pool backing this profiler.
    #[must_use]
    pub fn pool(&self) -> &AggregatePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Frame profiling
    // ------------------------------------------------------------------

    /// Switch to frame profiling for `frame_count` frames (clamped to
    /// `1..=1000`).
    ///
    /// The live statistics are preserved and restored once the last frame
    /// ends. Ignored if already profiling frames.
    pub fn profile_frames(&self, frame_count: u32) {
        let target_frames = frame_count.clamp(1, MAX_PROFILED_FRAMES);

        let pending = {
            let mut state = self.state.write();
            if matches!(state.mode, Mode::FrameProfiling(_)) {
                tracing::warn!("Frame profiling already active, request ignored");
                return;
            }

            let preserved: Vec<_> = state
                .labels
                .iter()
                .map(|(label, handle)| (*label, handle.lock().clone()))
                .collect();
            self.release_labels(&mut state);

            let previous_session = state.session.name.clone();
            let pending = self.start_session(&mut state, FRAME_SESSION_NAME);
            state.mode = Mode::FrameProfiling(Box::new(FrameCapture {
                preserved,
                previous_session,
                target_frames,
                current_frame: 0,
                records: Vec::with_capacity(target_frames as usize),
                last_frame: Instant::now(),
            }));
            self.pending_samples.store(0, Ordering::Release);
            pending
        };

        tracing::info!(frames = target_frames, "Frame profiling started");
        self.perform(pending);
    }

    /// Mark the end of a rendered frame.
    ///
    /// Returns `true` while frame profiling continues and `false` in normal
    /// mode or once the final frame has been recorded.
    pub fn end_frame(&self) -> bool {
        let (frame_session, records, pending) = {
            let mut state = self.state.write();
            let Mode::FrameProfiling(capture) = &mut state.mode else {
                return false;
            };

            let now = Instant::now();
            capture.records.push(FrameRecord {
                frame_number: capture.current_frame,
                frame_time_ms: now.duration_since(capture.last_frame).as_secs_f64() * 1000.0,
                timestamp: now_millis(),
            });
            capture.last_frame = now;
            capture.current_frame += 1;

            if capture.current_frame < capture.target_frames {
                return true;
            }

            let frame_session = state.session.name.clone();
            let Mode::FrameProfiling(capture) = std::mem::replace(&mut state.mode, Mode::Normal)
            else {
                return false;
            };
            let (records, pending) = self.restore_profiling_state(&mut state, *capture);
            (frame_session, records, pending)
        };

        let path = self.state.read().config.frames_output_path.clone();
        let report = FrameReport::new(&frame_session, records);
        match self.writer.write_frame_report(&path, &report) {
            Ok(()) => tracing::info!(
                frames = report.frames_profiled,
                "Frame profile written to {}",
                path.display()
            ),
            Err(e) => tracing::warn!("Failed to write frame profile {}: {}", path.display(), e),
        }

        self.perform(pending);
        false
    }

    /// Rebuild the live map from the preserved snapshot.
    ///
    /// Consumes the capture, so the frame counter, records and preserved
    /// table cannot outlive the excursion.
    fn restore_profiling_state(
        &self,
        state: &mut State,
        capture: FrameCapture,
    ) -> (Vec<FrameRecord>, Option<PendingWrite>) {
        let FrameCapture {
            preserved,
            previous_session,
            records,
            ..
        } = capture;

        self.release_labels(state);
        for (label, aggregate) in &preserved {
            let handle = self.pool.allocate_with(aggregate);
            state.labels.insert(*label, handle);
        }
        self.pending_samples.store(0, Ordering::Release);

        let pending = self.start_session(state, &previous_session);
        tracing::info!(
            "Frame profiling finished, restored session '{}'",
            previous_session
        );
        (records, pending)
    }

    /// Whether frame profiling is active.
    #[must_use]
    pub fn is_profiling_frames(&self) -> bool {
        matches!(self.state.read().mode, Mode::FrameProfiling(_))
    }

    /// Frames recorded so far in the current excursion (0 in normal mode).
    #[must_use]
    pub fn current_profiled_frame(&self) -> u32 {
        match &self.state.read().mode {
            Mode::FrameProfiling(capture) => capture.current_frame,
            Mode::Normal => 0,
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Enable or disable recording and report emission.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        let mut state = self.state.write();
        state.config.enabled = enabled;
        state.session.enabled = enabled;
    }

    /// Check if the profiler is enabled.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Select console or structured-file reports.
    pub fn set_output_format(&self, format: OutputFormat) {
        let mut state = self.state.write();
        state.config.output_format = format;
        self.hot
            .structured
            .store(format == OutputFormat::StructuredFile, Ordering::Relaxed);
    }

    /// Path of the structured profile report.
    pub fn set_output_path(&self, path: impl Into<PathBuf>) {
        self.state.write().config.output_path = path.into();
    }

    /// Path of the frame-profiling report.
    pub fn set_frames_output_path(&self, path: impl Into<PathBuf>) {
        self.state.write().config.frames_output_path = path.into();
    }

    /// Cap each label's retained history; applies from the next sample.
    pub fn set_max_samples(&self, max_samples: usize) {
        let max_samples = max_samples.max(1);
        self.state.write().config.max_samples = max_samples;
        self.hot.max_samples.store(max_samples, Ordering::Relaxed);
    }

    /// Decimal digits kept in report values.
    pub fn set_precision(&self, digits: u32) {
        self.state.write().config.precision = digits;
    }

    /// Samples since the last write that force a report write; 0 disables.
    pub fn set_batch_size(&self, batch_size: usize) {
        self.state.write().config.batch_size = batch_size;
        self.hot.batch_size.store(batch_size, Ordering::Relaxed);
    }

    /// Report fractional milliseconds from scope timers instead of whole ones.
    pub fn set_high_precision(&self, high_precision: bool) {
        self.high_precision.store(high_precision, Ordering::Release);
        self.state.write().config.high_precision = high_precision;
    }

    /// Check if scope timers report fractional milliseconds.
    #[must_use]
    pub fn is_high_precision(&self) -> bool {
        self.high_precision.load(Ordering::Acquire)
    }

    /// Minimum spacing between accepted samples on one thread.
    pub fn set_sample_interval(&self, interval: Duration) {
        self.state.write().config.sample_interval = interval;
        self.hot
            .sample_interval_us
            .store(micros(interval), Ordering::Relaxed);
    }

    /// Spacing between periodic report writes.
    pub fn set_auto_save_interval(&self, interval: Duration) {
        self.state.write().config.auto_save_interval = interval;
        self.hot.auto_save_us.store(micros(interval), Ordering::Relaxed);
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> ProfilerConfig {
        self.state.read().config.clone()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn perform(&self, pending: Option<PendingWrite>) {
        if let Some(PendingWrite { path, report }) = pending {
            self.persist_profile(&path, &report);
        }
    }

    fn persist_profile(&self, path: &Path, report: &ProfileReport) -> bool {
        match self.writer.write_profile_report(path, report) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to write profile {}: {}", path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc};
    use std::thread;

    use approx::assert_relative_eq;
    use tempfile::TempDir;

    use super::*;

    fn unthrottled(dir: &TempDir) -> Profiler {
        Profiler::new(ProfilerConfig {
            output_path: dir.path().join("profile.json"),
            frames_output_path: dir.path().join("frames.json"),
            sample_interval: Duration::ZERO,
            auto_save_interval: Duration::from_secs(3600),
            batch_size: 0,
            ..ProfilerConfig::default()
        })
    }

    #[test]
    fn records_statistics_per_label() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        for d in [2.0, 4.0, 6.0] {
            profiler.write_profile("Update", d);
        }
        profiler.write_profile("Render", 1.0);

        let update = profiler.stats("Update").expect("recorded");
        assert_eq!(update.calls, 3);
        assert_relative_eq!(update.average_ms, 4.0);
        assert_relative_eq!(update.min_ms, 2.0);
        assert_relative_eq!(update.max_ms, 6.0);
        assert_relative_eq!(update.total_ms, 12.0);
        assert_eq!(profiler.stats("Render").unwrap().calls, 1);
    }

    #[test]
    fn empty_label_and_disabled_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.write_profile("", 1.0);
        assert!(profiler.get_profiles().is_empty());

        profiler.set_enabled(false);
        profiler.write_profile("A", 1.0);
        assert!(profiler.stats("A").is_none());
        assert!(profiler.end_session().is_none());
    }

    #[test]
    fn throttle_drops_second_label_on_same_thread() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.set_sample_interval(Duration::from_secs(60));

        profiler.write_profile("A", 1.0);
        profiler.write_profile("B", 1.0);

        assert_eq!(profiler.stats("A").unwrap().calls, 1);
        assert!(profiler.stats("B").is_none());
    }

    #[test]
    fn throttle_spans_profilers_on_one_thread() {
        let dir = tempfile::tempdir().unwrap();
        let engine = unthrottled(&dir);
        let tools = unthrottled(&dir);
        engine.set_sample_interval(Duration::from_secs(60));
        tools.set_sample_interval(Duration::from_secs(60));

        for _ in 0..5 {
            engine.write_profile("X", 1.0);
            tools.write_profile("Y", 1.0);
        }

        assert_eq!(engine.stats("X").map(|s| s.calls), Some(1));
        assert!(tools.stats("Y").is_none());
    }

    #[test]
    fn alternating_profilers_keep_separate_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let engine = unthrottled(&dir);
        let tools = unthrottled(&dir);

        for _ in 0..3 {
            engine.write_profile("Shared", 1.0);
            tools.write_profile("Shared", 5.0);
        }

        assert_eq!(engine.stats("Shared").unwrap().calls, 3);
        assert_relative_eq!(engine.stats("Shared").unwrap().max_ms, 1.0);
        assert_eq!(tools.stats("Shared").unwrap().calls, 3);
        assert_relative_eq!(tools.stats("Shared").unwrap().min_ms, 5.0);
    }

    #[test]
    fn cache_hits_do_not_wait_for_the_map_lock() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Arc::new(unthrottled(&dir));
        let (primed_tx, primed_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        let worker = {
            let profiler = Arc::clone(&profiler);
            thread::spawn(move || {
                profiler.write_profile("A", 1.0);
                primed_tx.send(()).unwrap();
                go_rx.recv().unwrap();
                profiler.write_profile("A", 2.0);
                done_tx.send(()).unwrap();
            })
        };

        primed_rx.recv().unwrap();
        {
            let _map = profiler.state.write();
            go_tx.send(()).unwrap();
            assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        }
        worker.join().unwrap();

        let stats = profiler.stats("A").unwrap();
        assert_eq!(stats.calls, 2);
        assert_relative_eq!(stats.max_ms, 2.0);
    }

    #[test]
    fn negative_durations_report_true_maximum() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.write_profile("N", -1.0);
        profiler.write_profile("N", -3.0);

        let stats = profiler.stats("N").unwrap();
        assert_relative_eq!(stats.min_ms, -3.0);
        assert_relative_eq!(stats.average_ms, -2.0);
        assert_relative_eq!(stats.max_ms, -1.0);
    }

    #[test]
    fn throttle_is_per_thread() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Arc::new(unthrottled(&dir));
        profiler.set_sample_interval(Duration::from_secs(60));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let profiler = Arc::clone(&profiler);
                thread::spawn(move || profiler.write_profile("Shared", 1.0))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(profiler.stats("Shared").unwrap().calls, 4);
    }

    #[test]
    fn cached_labels_survive_clear() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.write_profile("A", 1.0);
        profiler.write_profile("A", 1.0);
        assert_eq!(profiler.pool().slab_in_use(), 1);

        profiler.clear_profiles();
        assert!(profiler.get_profiles().is_empty());
        assert_eq!(profiler.pool().slab_in_use(), 0);

        // The thread cache must not resolve to the released slot.
        profiler.write_profile("A", 3.0);
        let stats = profiler.stats("A").unwrap();
        assert_eq!(stats.calls, 1);
        assert_relative_eq!(stats.average_ms, 3.0);
    }

    #[test]
    fn labels_beyond_slab_use_heap() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Profiler::with_slab_capacity(
            ProfilerConfig {
                sample_interval: Duration::ZERO,
                output_path: dir.path().join("p.json"),
                ..ProfilerConfig::default()
            },
            2,
        );
        for label in ["a", "b", "c"] {
            profiler.write_profile(label, 1.0);
        }
        assert_eq!(profiler.pool().slab_in_use(), 2);
        assert_eq!(profiler.pool().heap_in_use(), 1);
        assert_eq!(profiler.get_profiles().len(), 3);
    }

    #[test]
    fn concurrent_writers_on_one_label() {
        // Aggregate updates are serialized per label; the count is exact here
        // but the contract only promises no crashes and no lost aggregates.
        let dir = tempfile::tempdir().unwrap();
        let profiler = Arc::new(unthrottled(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let profiler = Arc::clone(&profiler);
                thread::spawn(move || {
                    for _ in 0..500 {
                        profiler.write_profile("Hot", 0.5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = profiler.stats("Hot").unwrap();
        assert!(stats.calls <= 4000);
        assert!(stats.calls > 0);
        assert_relative_eq!(stats.average_ms, 0.5);
        assert_eq!(profiler.pool().slab_in_use(), 1);
    }

    #[test]
    fn begin_session_keeps_statistics_and_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.write_profile("A", 1.0);
        profiler.begin_session("Level 2");

        assert_eq!(profiler.session().name, "Level 2");
        assert_eq!(profiler.stats("A").unwrap().calls, 1);
        assert!(profiler.has_unsaved_data());

        let written: ProfileReport = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("profile.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written.session, "Level 2");
        assert!(written.profiles.is_empty());
    }

    #[test]
    fn end_session_writes_structured_report() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.begin_session("S");
        profiler.write_profile("Physics", 2.5);

        let report = profiler.end_session().expect("enabled");
        assert_eq!(report.entry("Physics").unwrap().calls, 1);
        assert!(!profiler.has_unsaved_data());

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("profile.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["session"], "S");
        assert_eq!(json["profiles"][0]["name"], "Physics");
        assert_eq!(json["profiles"][0]["averageMs"], 2.5);
    }

    #[test]
    fn batch_size_forces_write() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.set_batch_size(3);

        profiler.write_profile("A", 1.0);
        profiler.write_profile("A", 1.0);
        assert!(!dir.path().join("profile.json").exists());

        profiler.write_profile("A", 1.0);
        assert!(dir.path().join("profile.json").exists());
        assert!(!profiler.has_unsaved_data());
    }

    #[test]
    fn write_failures_keep_stats_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        // The output path is a directory, so every write fails.
        profiler.set_output_path(dir.path());
        profiler.write_profile("A", 1.0);

        assert!(!profiler.flush());
        assert!(profiler.end_session().is_some());
        assert!(profiler.has_unsaved_data());
        assert_eq!(profiler.get_profiles()["A"], vec![1.0]);
    }

    #[test]
    fn low_precision_truncates_to_whole_milliseconds() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.set_high_precision(false);
        profiler.record_elapsed(LabelKey::new("T"), Duration::from_micros(2_750));
        assert_relative_eq!(profiler.stats("T").unwrap().max_ms, 2.0);

        profiler.set_high_precision(true);
        profiler.record_elapsed(LabelKey::new("T"), Duration::from_micros(2_750));
        assert_relative_eq!(profiler.stats("T").unwrap().max_ms, 2.75);
    }

    #[test]
    fn frame_profiling_clamps_count() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.profile_frames(2000);
        assert!(profiler.is_profiling_frames());

        for _ in 0..999 {
            assert!(profiler.end_frame());
        }
        assert_eq!(profiler.current_profiled_frame(), 999);
        assert!(!profiler.end_frame());
        assert!(!profiler.is_profiling_frames());

        let report: FrameReport = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("frames.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(report.frames_profiled, MAX_PROFILED_FRAMES);
    }

    #[test]
    fn zero_frames_clamps_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.profile_frames(0);
        assert!(!profiler.end_frame());
        assert!(!profiler.is_profiling_frames());
    }

    #[test]
    fn end_frame_in_normal_mode_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        assert!(!profiler.end_frame());
        assert_eq!(profiler.current_profiled_frame(), 0);
        assert!(profiler.report().frame_data.is_none());
        assert!(!dir.path().join("frames.json").exists());
    }

    #[test]
    fn frame_mode_isolates_and_restores_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.begin_session("Gameplay");
        for d in [1.0, 2.0, 3.0] {
            profiler.write_profile("A", d);
        }
        let before = profiler.stats("A").unwrap();
        let slab_before = profiler.pool().slab_in_use();

        profiler.profile_frames(2);
        assert_eq!(profiler.session().name, FRAME_SESSION_NAME);
        assert!(profiler.stats("A").is_none());

        profiler.write_profile("A", 100.0);
        profiler.write_profile("FrameOnly", 7.0);
        assert!(profiler.end_session().is_none());
        assert!(profiler.end_frame());
        assert_eq!(profiler.report().frame_data.as_ref().map(Vec::len), Some(1));
        assert!(!profiler.end_frame());

        assert_eq!(profiler.session().name, "Gameplay");
        assert_eq!(profiler.stats("A").unwrap(), before);
        assert!(profiler.stats("FrameOnly").is_none());
        assert_eq!(profiler.pool().slab_in_use(), slab_before);
        assert!(profiler.report().frame_data.is_none());

        // Restored aggregates keep accumulating normally.
        profiler.write_profile("A", 6.0);
        assert_eq!(profiler.stats("A").unwrap().calls, 4);
    }

    #[test]
    fn repeated_profile_frames_request_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = unthrottled(&dir);
        profiler.profile_frames(3);
        assert!(profiler.end_frame());
        profiler.profile_frames(10);
        assert_eq!(profiler.current_profiled_frame(), 1);
    }
}
