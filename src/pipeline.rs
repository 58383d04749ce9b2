//! Orchestrates the linear C1→C10 pipeline described in spec.md §2: one
//! driving function, no concurrency exposed to the caller (spec.md §5).

use crate::catalog::SegmentCatalog;
use crate::coarsen::{run_with_coarsening, RunStatus as CoarsenStatus};
use crate::config::RunConfig;
use crate::error::Result;
use crate::flagging::flag_bins;
use crate::geometry::bin_polygon_wkb;
use crate::loaders::{events_yaml, rulebook_yaml, runners_csv, segments_csv};
use crate::metadata::{self, RunMetadata, RunStatus};
use crate::rollup::{rollup, rollup_segment_windows, FlaggedBinDetail, SegmentSummary};
use crate::serialize::{geojson, parquet};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};
use xxhash_rust::xxh3::xxh3_64;

pub struct RunInputs {
    pub runners_path: PathBuf,
    pub segments_path: PathBuf,
    pub events_path: PathBuf,
    pub rulebook_path: PathBuf,
}

/// Runs one full pipeline execution and returns its terminal status.
/// `run_dir` is this run's own directory; `index_dir` holds the cross-run
/// `latest.json`/`index.json` pointers.
pub fn execute_run(
    inputs: &RunInputs,
    mut cfg: RunConfig,
    run_dir: &Path,
    index_dir: &Path,
    run_id: String,
    started_at_iso: String,
) -> Result<RunStatus> {
    let started_at = Instant::now();
    cfg.apply_deploy_mode();

    let meta = RunMetadata::new_in_progress(run_id.clone(), started_at_iso);
    metadata::commit_in_progress(run_dir, &meta)?;

    let result = run_inner(inputs, &cfg, run_dir, meta.clone(), started_at);
    let saved_at = chrono_now_rfc3339();

    match result {
        Ok((final_meta, status)) => {
            metadata::commit_final(run_dir, index_dir, final_meta, status, None, saved_at)?;
            Ok(status)
        }
        Err(e) => {
            error!(run_id = %run_id, error = %e, "run failed");
            metadata::commit_final(run_dir, index_dir, meta, RunStatus::Failed, Some(e.to_string()), saved_at)?;
            Err(e)
        }
    }
}

fn run_inner(
    inputs: &RunInputs,
    cfg: &RunConfig,
    run_dir: &Path,
    mut meta: RunMetadata,
    started_at: Instant,
) -> Result<(RunMetadata, RunStatus)> {
    let rulebook = rulebook_yaml::load_rulebook(&inputs.rulebook_path)?;
    let events = events_yaml::load_events(&inputs.events_path)?;
    let event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
    let segment_rows = segments_csv::load_segments(&inputs.segments_path, &event_ids)?;
    let catalog = SegmentCatalog::build(segment_rows, &events)?;
    let runners = runners_csv::load_runners(&inputs.runners_path)?;

    info!(
        segments = catalog.len(),
        events = events.len(),
        runners = runners.len(),
        "loaded run inputs"
    );

    let outcome = run_with_coarsening(&catalog, &events, &runners, &rulebook, cfg, started_at)?;
    let mut bins = outcome.bins;

    flag_bins(&mut bins, cfg, &rulebook);

    let occupied_bins = bins.iter().filter(|b| b.count > 0).count();
    let nonzero_density_bins = bins.iter().filter(|b| b.density_pm2 > 0.0).count();
    if occupied_bins == 0 || nonzero_density_bins == 0 {
        let empty_occupancy = crate::error::PipelineError::EmptyOccupancy { occupied_bins, nonzero_density_bins };
        error!(error = %empty_occupancy, "run completed with empty occupancy, committing anyway");
    }

    let (summaries, details) = rollup(&bins, cfg.threshold_areal);
    let window_rollups = rollup_segment_windows(&bins);

    let geometries: Vec<Vec<u8>> = bins
        .iter()
        .map(|b| {
            catalog
                .get(&b.segment_id)
                .map(|seg| bin_polygon_wkb(&seg.centerline, seg.length_m, b.start_km, b.end_km, b.width_m))
                .unwrap_or_default()
        })
        .collect();

    if cfg.bin_dataset_enabled {
        let gz = geojson::build_geojson_gz(&bins, &catalog, cfg.feature_cap, cfg.gzip_cap_bytes)?;
        crate::serialize::write_atomic(&run_dir.join("bins.geojson.gz"), &gz)?;

        parquet::write_bins_parquet(&run_dir.join("bins.parquet"), &bins, &geometries)?;
        parquet::write_segment_windows_parquet(&run_dir.join("segments_from_bins.parquet"), &window_rollups)?;
        parquet::write_flagged_bin_detail_parquet(&run_dir.join("flagged_bins.parquet"), &details)?;
    }

    let bin_summary_json = serde_json::to_vec_pretty(&build_bin_summary_json(&summaries, &details))?;
    crate::serialize::write_atomic(&run_dir.join("bin_summary.json"), &bin_summary_json)?;

    let analysis_hash = format!("{:016x}", xxh3_64(format!("{:?}", (cfg.bin_size_km, cfg.dt_seconds)).as_bytes()));

    meta.schema_version = crate::serialize::SCHEMA_VERSION;
    meta.analysis_hash = analysis_hash;
    meta.occupied_bins = occupied_bins;
    meta.nonzero_density_bins = nonzero_density_bins;
    meta.total_features = bins.len();
    meta.start_times = events.iter().map(|e| e.start_time_min.to_string()).collect();
    meta.event_durations = events.iter().map(|e| e.duration_min).collect();

    let status = match outcome.status {
        CoarsenStatus::Complete => RunStatus::Complete,
        CoarsenStatus::Partial => RunStatus::Partial,
    };

    Ok((meta, status))
}

/// Builds `bin_summary.json`: the per-segment summary table and the
/// per-flagged-bin detail table, both keyed by `segment_id` (spec.md §4.9).
fn build_bin_summary_json(summaries: &[SegmentSummary], details: &[FlaggedBinDetail]) -> Value {
    let mut by_segment: std::collections::HashMap<&str, Vec<&FlaggedBinDetail>> = std::collections::HashMap::new();
    for d in details {
        by_segment.entry(d.segment_id.as_str()).or_default().push(d);
    }

    let mut out = serde_json::Map::with_capacity(summaries.len());
    for s in summaries {
        let los_distribution: std::collections::HashMap<String, f64> = s
            .los_distribution
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), *v))
            .collect();
        let flagged_bins = by_segment.get(s.segment_id.as_str()).cloned().unwrap_or_default();

        out.insert(
            s.segment_id.clone(),
            json!({
                "summary": {
                    "peak_density": s.peak_density,
                    "p95_density": s.p95_density,
                    "mean_density": s.mean_density,
                    "peak_rate": s.peak_rate,
                    "peak_concurrency": s.peak_concurrency,
                    "active_start": s.active_start,
                    "active_end": s.active_end,
                    "active_duration_s": s.active_duration_s,
                    "occupancy_rate": s.occupancy_rate,
                    "tot_areal_sec": s.tot_areal_sec,
                    "los_distribution": los_distribution,
                    "worst_severity": s.worst_severity,
                    "flagged_bin_count": s.flagged_bin_count,
                    "worst_bin_id": s.worst_bin_id,
                },
                "flagged_bins": flagged_bins,
            }),
        );
    }
    Value::Object(out)
}

fn chrono_now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
