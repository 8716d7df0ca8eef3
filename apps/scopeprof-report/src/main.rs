//! Console viewer for scopeprof reports.
//!
//! Loads a profile report written by a profiled application and prints
//! per-label statistics, or the summary of a frame-profiling report.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p scopeprof-report
//! cargo run -p scopeprof-report -- path/to/profile_results.json
//! cargo run -p scopeprof-report -- --frames frame_profile_results.json
//! ```

mod summary;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use scopeprof::{FrameReport, ProfileReport, DEFAULT_FRAMES_OUTPUT_PATH, DEFAULT_OUTPUT_PATH};
use tracing_subscriber::EnvFilter;

struct Args {
    input: Option<PathBuf>,
    frames: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = parse_args();
    let input = args.input.unwrap_or_else(|| {
        PathBuf::from(if args.frames {
            DEFAULT_FRAMES_OUTPUT_PATH
        } else {
            DEFAULT_OUTPUT_PATH
        })
    });

    if !input.exists() {
        eprintln!("Error: No profile data found at {}", input.display());
        return ExitCode::FAILURE;
    }

    match run(&input, args.frames) {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args() -> Args {
    let mut args = Args {
        input: None,
        frames: false,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--frames" | "-f" => args.frames = true,
            "--help" | "-h" => {
                println!("scopeprof report viewer");
                println!();
                println!("Usage: scopeprof-report [OPTIONS] [INPUT]");
                println!();
                println!("Arguments:");
                println!("  [INPUT]       Report file (default: {DEFAULT_OUTPUT_PATH})");
                println!();
                println!("Options:");
                println!("  -f, --frames  Read a frame-profiling report");
                println!("  -h, --help    Show this help message");
                std::process::exit(0);
            }
            _ => args.input = Some(PathBuf::from(arg)),
        }
    }

    args
}

fn run(input: &Path, frames: bool) -> anyhow::Result<String> {
    let data =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;

    if frames {
        let report: FrameReport = serde_json::from_str(&data)
            .with_context(|| format!("parsing frame report {}", input.display()))?;
        tracing::debug!(frames = report.frames.len(), "Loaded frame report");
        Ok(summary::render_frames(&report))
    } else {
        let report: ProfileReport = serde_json::from_str(&data)
            .with_context(|| format!("parsing profile report {}", input.display()))?;
        tracing::debug!(labels = report.profiles.len(), "Loaded profile report");
        Ok(summary::render_profile(&report))
    }
}
