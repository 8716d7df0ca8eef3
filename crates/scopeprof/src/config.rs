//! Profiler output configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::DEFAULT_MAX_SAMPLES;

/// Default path of the structured profile report.
pub const DEFAULT_OUTPUT_PATH: &str = "profile_results.json";

/// Default path of the frame-profiling report.
pub const DEFAULT_FRAMES_OUTPUT_PATH: &str = "frame_profile_results.json";

/// Minimum spacing between accepted samples on one thread (~60 Hz).
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_micros(16_666);

/// Spacing between periodic report writes.
pub const DEFAULT_AUTO_SAVE_INTERVAL: Duration = Duration::from_millis(500);

/// Unflushed samples that force an early report write.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Decimal digits kept in reports.
pub const DEFAULT_PRECISION: u32 = 3;

/// Where finished reports go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable summary on stdout.
    Console,
    /// JSON document at the configured output path.
    #[default]
    StructuredFile,
}

/// Runtime configuration of a [`Profiler`](crate::Profiler).
///
/// Every field can also be changed later through the profiler's setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub enabled: bool,
    pub output_format: OutputFormat,
    pub output_path: PathBuf,
    pub frames_output_path: PathBuf,
    /// Cap of each label's retained sample history.
    pub max_samples: usize,
    /// Decimal digits used when rounding report values.
    pub precision: u32,
    /// Pending samples that trigger a report write; 0 disables.
    pub batch_size: usize,
    /// Report fractional milliseconds from scope timers.
    pub high_precision: bool,
    #[serde(with = "duration_micros")]
    pub sample_interval: Duration,
    #[serde(with = "duration_micros")]
    pub auto_save_interval: Duration,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_format: OutputFormat::default(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            frames_output_path: PathBuf::from(DEFAULT_FRAMES_OUTPUT_PATH),
            max_samples: DEFAULT_MAX_SAMPLES,
            precision: DEFAULT_PRECISION,
            batch_size: DEFAULT_BATCH_SIZE,
            high_precision: true,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            auto_save_interval: DEFAULT_AUTO_SAVE_INTERVAL,
        }
    }
}

mod duration_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_micros()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_micros)
    }
}
