//! Event file -> analysis -> report files.

use approx::assert_abs_diff_eq;
use stripstat_algorithms::analyze_run;
use stripstat_core::geometry::RegionId;
use stripstat_core::hit::{EventQuality, RawEvent};
use stripstat_io::{
    strip_map_from_json, EventFileReader, EventFileWriter, ReportWriter, RunConfigFile,
};
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "analysis": {
        "timing": { "raw_window_ns": 2000.0, "dead_time_ns": 100.0 }
    },
    "detector": {
        "regions": [
            { "id": 1, "chamber": 1, "name": "A", "strip_count": 16, "strip_area_cm2": 2.0 },
            { "id": 2, "chamber": 1, "name": "B", "strip_count": 16, "strip_area_cm2": 2.0 }
        ]
    }
}"#;

fn mapping_json() -> String {
    let channels: Vec<String> = (1..=16)
        .map(|s| format!(r#"{{ "channel": {}, "region": 1, "strip": {s} }}"#, 100 + s))
        .chain((1..=16).map(|s| {
            format!(
                r#"{{ "channel": {}, "region": 2, "strip": {s}, "active": {} }}"#,
                200 + s,
                s != 16
            )
        }))
        .collect();
    format!(r#"{{ "channels": [{}] }}"#, channels.join(","))
}

fn events() -> Vec<RawEvent> {
    let mut events: Vec<RawEvent> = (0..500i64)
        .map(|i| {
            // Region 1 sees a single-strip signal at 700 ns in every event;
            // region 2 only sees noise on its masked strip.
            RawEvent::new(i, vec![105, 216], vec![700.0, 1500.0])
        })
        .collect();
    events.push(RawEvent::new(500, vec![105], vec![700.0]).with_quality(EventQuality::Corrupted));
    events.push(RawEvent::new(501, vec![105, 106], vec![700.0]));
    events
}

#[test]
fn test_file_round_trip_analysis() {
    let dir = TempDir::new().unwrap();
    let run = RunConfigFile::from_json(CONFIG).unwrap();
    let mapping = strip_map_from_json(&mapping_json(), &run.geometry).unwrap();

    let input = dir.path().join("run.sev");
    let mut writer = EventFileWriter::create(&input).unwrap();
    writer.write_events(&events()).unwrap();
    writer.flush().unwrap();

    let reader = EventFileReader::open(&input).unwrap();
    assert_eq!(reader.event_count(), 502);
    assert_eq!(reader.time_range(), Some((700.0, 1500.0)));

    let report = analyze_run(&reader, &run.geometry, &mapping, &run.analysis).unwrap();
    assert_eq!(report.counters.events_seen, 502);
    assert_eq!(report.counters.events_processed, 500);
    assert_eq!(report.counters.events_corrupted, 1);
    assert_eq!(report.counters.events_malformed, 1);

    let a = report.region(RegionId(1)).unwrap();
    assert!(a.window.window.contains(700.0));
    assert_abs_diff_eq!(a.metrics.efficiency, 1.0);
    assert_abs_diff_eq!(a.metrics.cluster_size, 1.0);

    // Masked strip noise shows up in the profile but not in the rates.
    let b = report.region(RegionId(2)).unwrap();
    assert_eq!(b.statistics.noise_profile.count(16), 500);
    assert_eq!(b.noise.masked_strips, vec![16]);
    assert!(b.noise.masked_rate > 0.0);
    assert_eq!(b.metrics.rate, 0.0);
    assert_eq!(b.metrics.efficiency, 0.0);

    let metrics_path = dir.path().join("run.csv");
    ReportWriter::create(&metrics_path)
        .unwrap()
        .write_metrics_csv(&report)
        .unwrap();
    let csv = std::fs::read_to_string(&metrics_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("region,chamber,name,"));
    assert!(lines[1].starts_with("1,1,A,32,"));

    let strips_path = dir.path().join("run_strips.csv");
    ReportWriter::create(&strips_path)
        .unwrap()
        .write_strip_rates_csv(&report, run.analysis.chip_size)
        .unwrap();
    let strips = std::fs::read_to_string(&strips_path).unwrap();
    assert_eq!(strips.lines().count(), 1 + 32);
    assert!(strips.lines().any(|l| l.starts_with("2,1,16,0,500,")));

    let json_path = dir.path().join("run.json");
    ReportWriter::create(&json_path)
        .unwrap()
        .write_json(&report)
        .unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(value["counters"]["events_processed"], 500);
    assert_eq!(value["regions"].as_array().unwrap().len(), 2);
    assert_eq!(value["chambers"][0]["regions"].as_array().unwrap().len(), 2);
}
