//! Report documents and the writer that persists them.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::aggregate::SampleAggregate;
use crate::error::Result;

/// Timing of one profiled frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_number: u32,
    pub frame_time_ms: f64,
    /// Wall-clock time in Unix milliseconds.
    pub timestamp: i64,
}

/// One label's entry in a [`ProfileReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntry {
    pub name: String,
    pub calls: u64,
    pub average_ms: f64,
    pub recent_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub total_ms: f64,
    pub samples: Vec<f64>,
}

impl ProfileEntry {
    /// Build an entry from an aggregate, rounding to `precision` digits.
    #[must_use]
    pub fn from_aggregate(name: &str, aggregate: &SampleAggregate, precision: u32) -> Self {
        Self {
            name: name.to_string(),
            calls: aggregate.calls(),
            average_ms: round_to(aggregate.average_ms(), precision),
            recent_ms: round_to(aggregate.recent_ms(), precision),
            min_ms: round_to(aggregate.min_ms(), precision),
            max_ms: round_to(aggregate.max_ms(), precision),
            total_ms: round_to(aggregate.total_ms(), precision),
            samples: aggregate
                .samples()
                .iter()
                .map(|&s| round_to(s, precision))
                .collect(),
        }
    }
}

/// Session-wide profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub session: String,
    /// Unix milliseconds, string-encoded.
    pub timestamp: String,
    pub profiles: Vec<ProfileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_data: Option<Vec<FrameRecord>>,
}

impl ProfileReport {
    /// Report with no profiles, stamped now.
    #[must_use]
    pub fn empty(session: &str) -> Self {
        Self {
            session: session.to_string(),
            timestamp: now_millis().to_string(),
            profiles: Vec::new(),
            frame_data: None,
        }
    }

    /// Look up a label's entry.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ProfileEntry> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

/// Derived frame timing figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameStatistics {
    pub total_frames: usize,
    pub average_frame_time_ms: f64,
    pub min_frame_time_ms: f64,
    pub max_frame_time_ms: f64,
    pub average_fps: f64,
    /// FPS of the slowest frame.
    pub min_fps: f64,
    /// FPS of the fastest frame.
    pub max_fps: f64,
}

impl FrameStatistics {
    /// Compute statistics, or `None` for an empty frame list.
    #[must_use]
    pub fn from_frames(frames: &[FrameRecord]) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }

        let (total, min, max) = frames.iter().fold(
            (0.0_f64, f64::MAX, f64::MIN),
            |(total, min, max), frame| {
                (
                    total + frame.frame_time_ms,
                    min.min(frame.frame_time_ms),
                    max.max(frame.frame_time_ms),
                )
            },
        );
        let average = total / frames.len() as f64;

        Some(Self {
            total_frames: frames.len(),
            average_frame_time_ms: average,
            min_frame_time_ms: min,
            max_frame_time_ms: max,
            average_fps: fps(average),
            min_fps: fps(max),
            max_fps: fps(min),
        })
    }
}

fn fps(frame_time_ms: f64) -> f64 {
    if frame_time_ms > 0.0 {
        1000.0 / frame_time_ms
    } else {
        0.0
    }
}

/// Document written when frame profiling completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub session: String,
    pub frames_profiled: u32,
    /// Unix milliseconds, string-encoded.
    pub timestamp: String,
    pub frames: Vec<FrameRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<FrameStatistics>,
}

impl FrameReport {
    #[must_use]
    pub fn new(session: &str, frames: Vec<FrameRecord>) -> Self {
        Self {
            session: session.to_string(),
            frames_profiled: u32::try_from(frames.len()).unwrap_or(u32::MAX),
            timestamp: now_millis().to_string(),
            statistics: FrameStatistics::from_frames(&frames),
            frames,
        }
    }
}

/// Persists reports; one writer at a time per instance.
#[derive(Default)]
pub struct ReportWriter {
    file_lock: Mutex<()>,
}

impl ReportWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a profile report as pretty JSON.
    pub fn write_profile_report(&self, path: &Path, report: &ProfileReport) -> Result<()> {
        self.write_json(path, report)
    }

    /// Write a frame report as pretty JSON.
    pub fn write_frame_report(&self, path: &Path, report: &FrameReport) -> Result<()> {
        self.write_json(path, report)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let _guard = self.file_lock.lock();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Print the console summary of a report to stdout.
    pub fn print_console(&self, report: &ProfileReport, precision: u32) {
        let text = render_console(report, precision);
        let _guard = self.file_lock.lock();
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()) {
            tracing::warn!("Failed to print profile summary: {}", e);
        }
    }
}

/// Render the per-label console summary.
#[must_use]
pub fn render_console(report: &ProfileReport, precision: u32) -> String {
    let p = precision as usize;
    let mut out = format!("Profile results for session '{}':\n", report.session);
    for entry in report.profiles.iter().filter(|e| e.calls > 0) {
        let _ = writeln!(
            out,
            "{}: Avg: {:.p$}ms, Min: {:.p$}ms, Max: {:.p$}ms, Calls: {}",
            entry.name, entry.average_ms, entry.min_ms, entry.max_ms, entry.calls
        );
    }
    out
}

/// Round to a fixed number of decimal digits.
#[must_use]
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10_f64.powi(i32::try_from(precision.min(15)).unwrap_or(15));
    (value * scale).round() / scale
}

/// Current wall-clock time in Unix milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
