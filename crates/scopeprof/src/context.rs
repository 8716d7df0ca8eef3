//! Global profiler context singleton.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::{OutputFormat, ProfilerConfig};
use crate::label::LabelKey;
use crate::profiler::Profiler;
use crate::report::ProfileReport;

/// Global profiler instance.
static PROFILER: RwLock<Option<Arc<Profiler>>> = RwLock::new(None);

/// Initialize the global profiler with the default configuration.
///
/// Call this once at application startup.
pub fn init() {
    init_with_config(ProfilerConfig::default());
}

/// Initialize the global profiler with a custom configuration.
///
/// Does nothing if a profiler is already installed.
pub fn init_with_config(config: ProfilerConfig) {
    let mut guard = PROFILER.write();
    if guard.is_none() {
        *guard = Some(Arc::new(Profiler::new(config)));
        crate::signals::rearm_cleanup();
        tracing::debug!("Global profiler initialized");
    }
}

/// Flush unsaved data and tear the global profiler down.
pub fn shutdown() {
    crate::signals::cleanup();
    if PROFILER.write().take().is_some() {
        tracing::debug!("Global profiler shut down");
    }
}

/// Check if the profiler is initialized.
#[must_use]
pub fn is_initialized() -> bool {
    PROFILER.read().is_some()
}

/// Shared handle to the global profiler, if initialized.
#[must_use]
pub fn global() -> Option<Arc<Profiler>> {
    PROFILER.read().clone()
}

#[inline]
fn with_profiler<R>(f: impl FnOnce(&Profiler) -> R) -> Option<R> {
    PROFILER.read().as_deref().map(f)
}

/// Record a duration in milliseconds.
#[inline]
pub fn write_profile(label: &str, duration_ms: f64) {
    with_profiler(|p| p.write_profile(label, duration_ms));
}

/// Record an elapsed duration from a scope timer.
#[inline]
pub(crate) fn record_elapsed(label: LabelKey, elapsed: Duration) {
    with_profiler(|p| p.record_elapsed(label, elapsed));
}

/// Start a new named session.
pub fn begin_session(name: &str) {
    with_profiler(|p| p.begin_session(name));
}

/// Emit the final report for the current session.
pub fn end_session() -> Option<ProfileReport> {
    with_profiler(Profiler::end_session).flatten()
}

/// Flush unsaved data to the report file.
pub fn flush() -> bool {
    with_profiler(Profiler::flush).unwrap_or(false)
}

/// Enable or disable profiling.
pub fn set_enabled(enabled: bool) {
    with_profiler(|p| p.set_enabled(enabled));
}

/// Whether the global profiler exists and is enabled.
#[must_use]
pub fn is_enabled() -> bool {
    with_profiler(Profiler::is_enabled).unwrap_or(false)
}

/// Select console or structured-file reports.
pub fn set_output_format(format: OutputFormat) {
    with_profiler(|p| p.set_output_format(format));
}

/// Set the path of the structured profile report.
pub fn set_output_path(path: impl Into<PathBuf>) {
    let path = path.into();
    with_profiler(|p| p.set_output_path(path));
}

/// Set the path of the frame-profiling report.
pub fn set_frames_output_path(path: impl Into<PathBuf>) {
    let path = path.into();
    with_profiler(|p| p.set_frames_output_path(path));
}

/// Cap each label's retained sample history.
pub fn set_max_samples(max_samples: usize) {
    with_profiler(|p| p.set_max_samples(max_samples));
}

/// Set the decimal digits kept in reports.
pub fn set_precision(digits: u32) {
    with_profiler(|p| p.set_precision(digits));
}

/// Set the sample count that forces a report write (0 disables).
pub fn set_batch_size(batch_size: usize) {
    with_profiler(|p| p.set_batch_size(batch_size));
}

/// Report fractional milliseconds from scope timers.
pub fn set_high_precision(high_precision: bool) {
    with_profiler(|p| p.set_high_precision(high_precision));
}

/// Snapshot of every label's retained samples.
#[must_use]
pub fn get_profiles() -> std::collections::HashMap<String, Vec<f64>> {
    with_profiler(Profiler::get_profiles).unwrap_or_default()
}

/// Reset all profiling statistics.
pub fn clear_profiles() {
    with_profiler(Profiler::clear_profiles);
}

/// Profile the next `frame_count` frames in isolation.
pub fn profile_frames(frame_count: u32) {
    with_profiler(|p| p.profile_frames(frame_count));
}

/// Mark the end of a rendered frame. Call once per frame.
pub fn end_frame() -> bool {
    with_profiler(Profiler::end_frame).unwrap_or(false)
}

/// Check if frame profiling is active.
#[must_use]
pub fn is_profiling_frames() -> bool {
    with_profiler(Profiler::is_profiling_frames).unwrap_or(false)
}

/// Frames recorded so far in the current frame capture.
#[must_use]
pub fn current_profiled_frame() -> u32 {
    with_profiler(Profiler::current_profiled_frame).unwrap_or(0)
}
