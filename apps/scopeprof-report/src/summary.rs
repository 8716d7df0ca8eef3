//! Per-label statistics derived from a report's retained samples.

use std::fmt::Write as _;

use scopeprof::{FrameReport, ProfileEntry, ProfileReport};

/// Statistics of one label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSummary {
    pub name: String,
    pub calls: u64,
    pub samples: usize,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Estimated total cost: sample mean times all-time calls.
    pub total_ms: f64,
}

impl LabelSummary {
    /// Summarize an entry; falls back to the recorded stats without samples.
    #[must_use]
    pub fn from_entry(entry: &ProfileEntry) -> Self {
        let samples = &entry.samples;
        let n = samples.len();

        let (mean, std_dev, min, max) = if n == 0 {
            (entry.average_ms, 0.0, entry.min_ms, entry.max_ms)
        } else {
            let mean = samples.iter().sum::<f64>() / n as f64;
            let std_dev = if n > 1 {
                let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                var.sqrt()
            } else {
                0.0
            };
            let min = samples.iter().copied().fold(f64::MAX, f64::min);
            let max = samples.iter().copied().fold(f64::MIN, f64::max);
            (mean, std_dev, min, max)
        };

        Self {
            name: entry.name.clone(),
            calls: entry.calls,
            samples: n,
            mean_ms: mean,
            std_dev_ms: std_dev,
            min_ms: min,
            max_ms: max,
            total_ms: mean * entry.calls as f64,
        }
    }
}

/// Summaries sorted by total cost, cheapest first.
#[must_use]
pub fn summarize(report: &ProfileReport) -> Vec<LabelSummary> {
    let mut rows: Vec<LabelSummary> = report.profiles.iter().map(LabelSummary::from_entry).collect();
    rows.sort_by(|a, b| a.total_ms.total_cmp(&b.total_ms));
    rows
}

#[must_use]
pub fn render_profile(report: &ProfileReport) -> String {
    let mut out = format!(
        "Session: {} (timestamp {})\n\nFunction Statistics:\n",
        report.session, report.timestamp
    );
    for row in summarize(report) {
        let _ = write!(
            out,
            "\n{}:\n  Calls: {}\n  Samples: {}\n  Average: {:.3}ms\n  Std Dev: {:.3}ms\n  \
             Min/Max: {:.3}ms / {:.3}ms\n  Total Time: {:.1}ms\n",
            row.name,
            row.calls,
            row.samples,
            row.mean_ms,
            row.std_dev_ms,
            row.min_ms,
            row.max_ms,
            row.total_ms
        );
    }
    if let Some(frames) = &report.frame_data {
        let _ = writeln!(out, "\nFrames recorded in session: {}", frames.len());
    }
    out
}

#[must_use]
pub fn render_frames(report: &FrameReport) -> String {
    let mut out = format!(
        "Session: {} (timestamp {})\nFrames profiled: {}\n",
        report.session, report.timestamp, report.frames_profiled
    );
    match &report.statistics {
        Some(stats) => {
            let _ = write!(
                out,
                "\nFrame time: avg {:.3}ms, min {:.3}ms, max {:.3}ms\n\
                 FPS: avg {:.1}, min {:.1}, max {:.1}\n",
                stats.average_frame_time_ms,
                stats.min_frame_time_ms,
                stats.max_frame_time_ms,
                stats.average_fps,
                stats.min_fps,
                stats.max_fps
            );
        }
        None => out.push_str("\nNo frames recorded.\n"),
    }
    out
}
