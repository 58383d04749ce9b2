//! Black-box run of the full pipeline (C1 through C10) against a tiny
//! course with one event, one segment, and a handful of runners.

use racecourse_density::config::RunConfig;
use racecourse_density::metadata::RunStatus;
use racecourse_density::pipeline::{self, RunInputs};
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

fn write_fixture(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "{contents}").unwrap();
    f
}

#[test]
fn end_to_end_run_produces_complete_status_and_artifacts() {
    let runners = write_fixture(
        "event,runner_id,pace_min_per_km,start_offset_s\n\
         full,r1,4.0,0\n\
         full,r2,4.2,30\n\
         full,r3,4.5,60\n\
         full,r4,5.0,90\n",
    );

    let segments = write_fixture(
        "segment_id,seg_label,width_m,length_m,direction,flow_type,full_present,full_from_km,full_to_km\n\
         S1,Start Straight,6,1000,out,open,true,0.0,1.0\n",
    );

    let events = write_fixture("full:\n  start_time: \"07:00\"\n  duration_min: 10\n");

    let rulebook = write_fixture(
        r#"
meta:
  version: "2.0"
schemas:
  default:
    los_bands:
      - {letter: A, min: 0.0, max: 0.36}
      - {letter: B, min: 0.36, max: 0.54}
      - {letter: C, min: 0.54, max: 0.72}
      - {letter: D, min: 0.72, max: 1.08}
      - {letter: E, min: 1.08, max: 1.63}
      - {letter: F, min: 1.63, max: .inf}
    triggers:
      - id: overcrowd
        when: {density_gte: D}
        actions: ["notify_marshal"]
binding:
  - flow_type: open
    schema: default
    priority: 0
"#,
    );

    let run_dir = tempdir().unwrap();
    let index_dir = tempdir().unwrap();

    let inputs = RunInputs {
        runners_path: runners.path().to_path_buf(),
        segments_path: segments.path().to_path_buf(),
        events_path: events.path().to_path_buf(),
        rulebook_path: rulebook.path().to_path_buf(),
    };

    let cfg = RunConfig {
        dt_seconds: 120,
        bin_size_km: 0.25,
        lead_padding_s: 0.0,
        trail_padding_s: 0.0,
        ..RunConfig::default()
    };

    let status = pipeline::execute_run(
        &inputs,
        cfg,
        run_dir.path(),
        index_dir.path(),
        "test-run-1".to_string(),
        "2026-07-27T07:00:00Z".to_string(),
    )
    .unwrap();

    assert_eq!(status, RunStatus::Complete);

    let metadata_path = run_dir.path().join("metadata.json");
    assert!(metadata_path.exists());
    let metadata_text = std::fs::read_to_string(&metadata_path).unwrap();
    assert!(metadata_text.contains("\"run_id\": \"test-run-1\""));
    assert!(metadata_text.contains("\"status\": \"complete\""));

    assert!(run_dir.path().join("bins.geojson.gz").exists());
    assert!(run_dir.path().join("bins.parquet").exists());
    assert!(run_dir.path().join("segments_from_bins.parquet").exists());
    assert!(run_dir.path().join("flagged_bins.parquet").exists());
    assert!(run_dir.path().join("bin_summary.json").exists());

    let latest_path = index_dir.path().join("latest.json");
    assert!(latest_path.exists());
    let latest_text = std::fs::read_to_string(&latest_path).unwrap();
    assert!(latest_text.contains("test-run-1"));

    let index_path = index_dir.path().join("index.json");
    assert!(index_path.exists());
}

#[test]
fn multi_event_window_rollup_has_one_row_per_segment_per_window_and_keeps_event_order() {
    let runners = write_fixture(
        "event,runner_id,pace_min_per_km,start_offset_s\n\
         half,r1,4.0,0\n\
         half,r2,4.2,30\n\
         full,r3,4.5,0\n\
         full,r4,5.0,30\n",
    );

    let segments = write_fixture(
        "segment_id,seg_label,width_m,length_m,direction,flow_type,half_present,half_from_km,half_to_km,full_present,full_from_km,full_to_km\n\
         S1,Start Straight,6,1000,out,open,true,0.0,1.0,true,0.0,1.0\n\
         S2,Back Straight,6,1000,out,open,true,0.0,1.0,true,0.0,1.0\n",
    );

    // "half" listed before "full" here; alphabetical order would reverse this.
    let events = write_fixture(
        "half:\n  start_time: \"07:00\"\n  duration_min: 10\nfull:\n  start_time: \"07:00\"\n  duration_min: 10\n",
    );

    let rulebook = write_fixture(
        r#"
meta:
  version: "2.0"
schemas:
  default:
    los_bands:
      - {letter: A, min: 0.0, max: 0.36}
      - {letter: B, min: 0.36, max: 0.54}
      - {letter: C, min: 0.54, max: 0.72}
      - {letter: D, min: 0.72, max: 1.08}
      - {letter: E, min: 1.08, max: 1.63}
      - {letter: F, min: 1.63, max: .inf}
    triggers: []
binding:
  - flow_type: open
    schema: default
    priority: 0
"#,
    );

    let run_dir = tempdir().unwrap();
    let index_dir = tempdir().unwrap();

    let inputs = RunInputs {
        runners_path: runners.path().to_path_buf(),
        segments_path: segments.path().to_path_buf(),
        events_path: events.path().to_path_buf(),
        rulebook_path: rulebook.path().to_path_buf(),
    };

    let cfg = RunConfig {
        dt_seconds: 300,
        bin_size_km: 0.25,
        lead_padding_s: 0.0,
        trail_padding_s: 0.0,
        ..RunConfig::default()
    };

    let status = pipeline::execute_run(
        &inputs,
        cfg,
        run_dir.path(),
        index_dir.path(),
        "test-run-multi".to_string(),
        "2026-07-27T07:00:00Z".to_string(),
    )
    .unwrap();
    assert_eq!(status, RunStatus::Complete);

    // 2 segments x 2 windows (10 minutes at 300s/window).
    let mut file = std::fs::File::open(run_dir.path().join("segments_from_bins.parquet")).unwrap();
    let df = polars::prelude::ParquetReader::new(&mut file).finish().unwrap();
    assert_eq!(df.height(), 4);

    let gz_bytes = std::fs::read(run_dir.path().join("bins.geojson.gz")).unwrap();
    let mut decoder = flate2::read::GzDecoder::new(gz_bytes.as_slice());
    let mut raw = String::new();
    std::io::Read::read_to_string(&mut decoder, &mut raw).unwrap();
    let collection: serde_json::Value = serde_json::from_str(&raw).unwrap();

    let overlapping_bin_events = collection["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["event"].as_array().unwrap().clone())
        .find(|events| events.len() == 2)
        .expect("at least one bin overlapping both events");
    let event_ids: Vec<&str> = overlapping_bin_events.iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(event_ids, vec!["half", "full"]);
}

#[test]
fn missing_rulebook_file_fails_the_run_and_records_failure() {
    let runners = write_fixture("event,runner_id,pace_min_per_km,start_offset_s\nfull,r1,5.0,0\n");
    let segments = write_fixture(
        "segment_id,seg_label,width_m,length_m,direction,flow_type,full_present,full_from_km,full_to_km\n\
         S1,Start Straight,6,500,out,open,true,0.0,0.5\n",
    );
    let events = write_fixture("full:\n  start_time: \"07:00\"\n  duration_min: 5\n");

    let run_dir = tempdir().unwrap();
    let index_dir = tempdir().unwrap();

    let inputs = RunInputs {
        runners_path: runners.path().to_path_buf(),
        segments_path: segments.path().to_path_buf(),
        events_path: events.path().to_path_buf(),
        rulebook_path: run_dir.path().join("does_not_exist.yaml"),
    };

    let result = pipeline::execute_run(
        &inputs,
        RunConfig::default(),
        run_dir.path(),
        index_dir.path(),
        "test-run-2".to_string(),
        "2026-07-27T07:00:00Z".to_string(),
    );

    assert!(result.is_err());

    let metadata_text = std::fs::read_to_string(run_dir.path().join("metadata.json")).unwrap();
    assert!(metadata_text.contains("\"status\": \"failed\""));
    assert!(!index_dir.path().join("latest.json").exists());
}
