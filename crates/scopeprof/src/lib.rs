//! Low-overhead scope profiling.
//!
//! This crate records wall-clock durations of instrumented code regions under
//! string labels and keeps per-label statistics (call count, min/max/average,
//! a moving average of recent durations, and a bounded sample history).
//! Results are exported to a JSON report or a console summary.
//!
//! # Feature Flags
//!
//! - `profiling`: Enable the instrumentation macros. When disabled,
//!   `profile_scope!` and `profile_function!` expand to nothing.
//!
//! # Usage
//!
//! Initialize the profiler at application startup:
//!
//! ```ignore
//! scopeprof::init();
//! scopeprof::init_signal_handlers();
//! scopeprof::begin_session("Startup");
//! ```
//!
//! Use the profiling macros to instrument code:
//!
//! ```ignore
//! use scopeprof::profile_scope;
//!
//! fn update_world() {
//!     profile_scope!("World::update");
//!     // ... update code
//! }
//! ```
//!
//! To time individual frames, start a frame capture and call `end_frame`
//! once per rendered frame:
//!
//! ```ignore
//! scopeprof::profile_frames(120);
//! while scopeprof::end_frame() {
//!     render();
//! }
//! ```
//!
//! A [`Profiler`] can also be constructed directly and passed around as a
//! context object instead of using the global instance.

mod aggregate;
mod cache;
mod config;
mod context;
mod error;
mod label;
mod macros;
mod pool;
mod profiler;
mod report;
mod signals;
mod timer;

// Re-export public API
pub use aggregate::{AggregateStats, SampleAggregate, EMA_ALPHA, INLINE_SAMPLES};
pub use cache::{FastPathCache, CACHE_CAPACITY};
pub use config::{
    OutputFormat, ProfilerConfig, DEFAULT_FRAMES_OUTPUT_PATH, DEFAULT_OUTPUT_PATH,
};
pub use context::{
    begin_session, clear_profiles, current_profiled_frame, end_frame, end_session, flush,
    get_profiles, global, init, init_with_config, is_enabled, is_initialized,
    is_profiling_frames, profile_frames, set_batch_size, set_enabled, set_frames_output_path,
    set_high_precision, set_max_samples, set_output_format, set_output_path, set_precision,
    shutdown, write_profile,
};
pub use error::{ReportError, Result};
pub use label::{LabelKey, LABEL_CAPACITY};
pub use pool::{AggregateHandle, AggregatePool, DEFAULT_SLAB_CAPACITY};
pub use profiler::{
    Profiler, Session, DEFAULT_SESSION_NAME, FRAME_SESSION_NAME, MAX_PROFILED_FRAMES,
};
pub use report::{
    render_console, FrameRecord, FrameReport, FrameStatistics, ProfileEntry, ProfileReport,
    ReportWriter,
};
pub use signals::{cleanup, init_signal_handlers};
pub use timer::ScopeTimer;
