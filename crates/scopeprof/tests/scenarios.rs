//! End-to-end session and frame-profiling scenarios.

use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use scopeprof::{FrameReport, OutputFormat, Profiler, ProfilerConfig, MAX_PROFILED_FRAMES};
use tempfile::TempDir;

/// Comfortably longer than the default ~16.7 ms per-thread sample interval.
const PAST_RATE_LIMIT: Duration = Duration::from_millis(20);

fn profiler_in(dir: &TempDir) -> Profiler {
    Profiler::new(ProfilerConfig {
        output_path: dir.path().join("profile_results.json"),
        frames_output_path: dir.path().join("frame_profile_results.json"),
        ..ProfilerConfig::default()
    })
}

fn write_spaced(profiler: &Profiler, label: &str, duration_ms: f64, times: usize) {
    for _ in 0..times {
        profiler.write_profile(label, duration_ms);
        thread::sleep(PAST_RATE_LIMIT);
    }
}

#[test]
fn console_session_reports_label_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let profiler = profiler_in(&dir);
    profiler.set_output_format(OutputFormat::Console);

    profiler.begin_session("T");
    write_spaced(&profiler, "A", 5.0, 3);

    let report = profiler.end_session().expect("profiler is enabled");
    assert_eq!(report.session, "T");
    let a = report.entry("A").expect("label A reported");
    assert_eq!(a.calls, 3);
    assert_relative_eq!(a.average_ms, 5.0);
    assert_relative_eq!(a.min_ms, 5.0);
    assert_relative_eq!(a.max_ms, 5.0);

    // Console output never touches the report file.
    assert!(!dir.path().join("profile_results.json").exists());
}

#[test]
fn back_to_back_writes_share_one_throttle() {
    let dir = tempfile::tempdir().unwrap();
    let profiler = profiler_in(&dir);

    profiler.write_profile("Fast", 1.0);
    profiler.write_profile("Slow", 1.0);

    assert_eq!(profiler.stats("Fast").map(|s| s.calls), Some(1));
    assert!(profiler.stats("Slow").is_none());

    thread::sleep(PAST_RATE_LIMIT);
    profiler.write_profile("Slow", 1.0);
    assert_eq!(profiler.stats("Slow").map(|s| s.calls), Some(1));
}

#[test]
fn frame_profiling_restores_previous_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let profiler = profiler_in(&dir);
    profiler.begin_session("Gameplay");
    write_spaced(&profiler, "A", 5.0, 3);

    let before = profiler.stats("A").unwrap();
    assert_eq!(before.calls, 3);
    assert_relative_eq!(before.average_ms, 5.0);

    profiler.profile_frames(3);
    assert!(profiler.is_profiling_frames());

    write_spaced(&profiler, "A", 50.0, 2);
    assert!(profiler.end_frame());
    assert!(profiler.end_frame());
    assert_eq!(profiler.current_profiled_frame(), 2);
    assert!(!profiler.end_frame());

    assert!(!profiler.is_profiling_frames());
    assert_eq!(profiler.session().name, "Gameplay");
    let after = profiler.stats("A").unwrap();
    assert_eq!(after.calls, 3);
    assert_relative_eq!(after.average_ms, 5.0);
    assert_eq!(after, before);

    let frames: FrameReport = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("frame_profile_results.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(frames.frames.len(), 3);
    assert_eq!(frames.frames_profiled, 3);
    let numbers: Vec<u32> = frames.frames.iter().map(|f| f.frame_number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    let stats = frames.statistics.expect("frames recorded");
    assert_eq!(stats.total_frames, 3);
    assert!(stats.min_frame_time_ms <= stats.average_frame_time_ms);
    assert!(stats.average_frame_time_ms <= stats.max_frame_time_ms);
}

#[test]
fn oversized_frame_request_is_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let profiler = profiler_in(&dir);
    profiler.profile_frames(2000);

    let mut frames = 1;
    while profiler.end_frame() {
        frames += 1;
    }
    assert_eq!(frames, MAX_PROFILED_FRAMES);
}

#[test]
fn end_frame_outside_frame_mode_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let profiler = profiler_in(&dir);

    assert!(!profiler.end_frame());
    assert!(!profiler.is_profiling_frames());
    assert!(!dir.path().join("frame_profile_results.json").exists());
}

#[test]
fn structured_report_matches_schema() {
    let dir = tempfile::tempdir().unwrap();
    let profiler = profiler_in(&dir);
    profiler.begin_session("Schema");
    write_spaced(&profiler, "World::tick", 2.0, 2);
    profiler.end_session();

    let json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("profile_results.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(json["session"], "Schema");
    assert!(json["timestamp"].as_str().unwrap().parse::<i64>().is_ok());

    let entry = &json["profiles"][0];
    assert_eq!(entry["name"], "World::tick");
    assert_eq!(entry["calls"], 2);
    for key in ["averageMs", "recentMs", "minMs", "maxMs", "totalMs"] {
        assert!(entry[key].is_number(), "{key} missing");
    }
    assert_eq!(entry["samples"].as_array().unwrap().len(), 2);
    assert!(json.get("frame_data").is_none());
}
