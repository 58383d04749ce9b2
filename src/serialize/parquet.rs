//! Parquet artifacts via `polars`: the bin table and the two rollup tables,
//! sharing the bin schema documented in `serialize::geojson`.

use crate::bins::Bin;
use crate::error::{PipelineError, Result};
use crate::rollup::{FlaggedBinDetail, SegmentWindowRollup};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use super::SCHEMA_VERSION;

/// Writes `bins.parquet`: one row per bin, columns matching the GeoJSON
/// feature properties plus the geometry WKB as a binary column.
pub fn write_bins_parquet(path: &Path, bins: &[Bin], geometries: &[Vec<u8>]) -> Result<()> {
    if bins.len() != geometries.len() {
        return Err(PipelineError::InvalidInput(
            "bins and geometries length mismatch".to_string(),
        ));
    }

    let bin_id: Vec<&str> = bins.iter().map(|b| b.bin_id.as_str()).collect();
    let segment_id: Vec<&str> = bins.iter().map(|b| b.segment_id.as_str()).collect();
    let start_km: Vec<f64> = bins.iter().map(|b| b.start_km).collect();
    let end_km: Vec<f64> = bins.iter().map(|b| b.end_km).collect();
    let t_start: Vec<i64> = bins.iter().map(|b| b.t_start).collect();
    let t_end: Vec<i64> = bins.iter().map(|b| b.t_end).collect();
    let window_idx: Vec<u32> = bins.iter().map(|b| b.window_idx as u32).collect();
    let density: Vec<f64> = bins.iter().map(|b| b.density_pm2).collect();
    let rate: Vec<f64> = bins.iter().map(|b| b.rate_p_s).collect();
    let rate_per_m_per_min: Vec<f64> = bins.iter().map(|b| b.rate_p_min_per_m).collect();
    let los_class: Vec<&str> = bins.iter().map(|b| b.los_class.as_str()).collect();
    let bin_size_km: Vec<f64> = bins.iter().map(|b| b.bin_size_km).collect();
    let schema_version: Vec<u32> = vec![SCHEMA_VERSION; bins.len()];
    let width_m: Vec<f64> = bins.iter().map(|b| b.width_m).collect();
    let schema_key: Vec<&str> = bins.iter().map(|b| b.schema_key.as_str()).collect();
    let flag_severity: Vec<&str> = bins
        .iter()
        .map(|b| match b.severity {
            crate::flagging::Severity::None => "none",
            crate::flagging::Severity::Watch => "watch",
            crate::flagging::Severity::Caution => "caution",
            crate::flagging::Severity::Critical => "critical",
        })
        .collect();
    let flag_reason: Vec<&str> = bins
        .iter()
        .map(|b| match b.flag_reason {
            crate::flagging::FlagReason::None => "NONE",
            crate::flagging::FlagReason::LosHigh => "LOS_HIGH",
            crate::flagging::FlagReason::UtilizationHigh => "UTILIZATION_HIGH",
            crate::flagging::FlagReason::Both => "BOTH",
        })
        .collect();
    let util_percent: Vec<f64> = bins.iter().map(|b| b.util_percentile).collect();
    // Events are joined into a single delimited string rather than a nested
    // list column -- keeps the table flat and trivially readable by any
    // Parquet consumer, at the cost of a client-side split on ",".
    let event: Vec<String> = bins.iter().map(|b| b.events.join(",")).collect();

    let mut df = DataFrame::new(vec![
        Series::new("bin_id".into(), bin_id).into(),
        Series::new("segment_id".into(), segment_id).into(),
        Series::new("start_km".into(), start_km).into(),
        Series::new("end_km".into(), end_km).into(),
        Series::new("t_start".into(), t_start).into(),
        Series::new("t_end".into(), t_end).into(),
        Series::new("window_idx".into(), window_idx).into(),
        Series::new("density".into(), density).into(),
        Series::new("rate".into(), rate).into(),
        Series::new("rate_per_m_per_min".into(), rate_per_m_per_min).into(),
        Series::new("los_class".into(), los_class).into(),
        Series::new("bin_size_km".into(), bin_size_km).into(),
        Series::new("schema_version".into(), schema_version).into(),
        Series::new("width_m".into(), width_m).into(),
        Series::new("schema_key".into(), schema_key).into(),
        Series::new("flag_severity".into(), flag_severity).into(),
        Series::new("flag_reason".into(), flag_reason).into(),
        Series::new("util_percent".into(), util_percent.clone()).into(),
        Series::new("util_percentile".into(), util_percent).into(),
        Series::new("event".into(), event).into(),
        Series::new("geometry".into(), geometries.to_vec()).into(),
    ])?;

    persist_dataframe(path, &mut df)
}

/// Writes `segments_from_bins.parquet`: one row per `(segment_id,
/// window_idx)`, carrying the length-weighted mean density, peak density,
/// and bin count for that window (see `rollup::rollup_segment_windows`).
pub fn write_segment_windows_parquet(path: &Path, rollups: &[SegmentWindowRollup]) -> Result<()> {
    let segment_id: Vec<&str> = rollups.iter().map(|r| r.segment_id.as_str()).collect();
    let window_idx: Vec<u32> = rollups.iter().map(|r| r.window_idx as u32).collect();
    let t_start: Vec<i64> = rollups.iter().map(|r| r.t_start).collect();
    let t_end: Vec<i64> = rollups.iter().map(|r| r.t_end).collect();
    let density_mean: Vec<f64> = rollups.iter().map(|r| r.density_mean).collect();
    let density_peak: Vec<f64> = rollups.iter().map(|r| r.density_peak).collect();
    let n_bins: Vec<u32> = rollups.iter().map(|r| r.n_bins).collect();

    let mut df = DataFrame::new(vec![
        Series::new("segment_id".into(), segment_id).into(),
        Series::new("window_idx".into(), window_idx).into(),
        Series::new("t_start".into(), t_start).into(),
        Series::new("t_end".into(), t_end).into(),
        Series::new("density_mean".into(), density_mean).into(),
        Series::new("density_peak".into(), density_peak).into(),
        Series::new("n_bins".into(), n_bins).into(),
    ])?;

    persist_dataframe(path, &mut df)
}

/// Writes the flat flagged-bin detail table.
pub fn write_flagged_bin_detail_parquet(path: &Path, details: &[FlaggedBinDetail]) -> Result<()> {
    let segment_id: Vec<&str> = details.iter().map(|d| d.segment_id.as_str()).collect();
    let bin_id: Vec<&str> = details.iter().map(|d| d.bin_id.as_str()).collect();
    let start_km: Vec<f64> = details.iter().map(|d| d.start_km).collect();
    let window_idx: Vec<u32> = details.iter().map(|d| d.window_idx as u32).collect();
    let severity: Vec<&str> = details
        .iter()
        .map(|d| match d.severity {
            crate::flagging::Severity::None => "none",
            crate::flagging::Severity::Watch => "watch",
            crate::flagging::Severity::Caution => "caution",
            crate::flagging::Severity::Critical => "critical",
        })
        .collect();
    let density_pm2: Vec<f64> = details.iter().map(|d| d.density_pm2).collect();
    let los_class: Vec<&str> = details.iter().map(|d| d.los_class.as_str()).collect();
    let triggered_actions: Vec<String> = details.iter().map(|d| d.triggered_actions.join(",")).collect();

    let mut df = DataFrame::new(vec![
        Series::new("segment_id".into(), segment_id).into(),
        Series::new("bin_id".into(), bin_id).into(),
        Series::new("start_km".into(), start_km).into(),
        Series::new("window_idx".into(), window_idx).into(),
        Series::new("severity".into(), severity).into(),
        Series::new("density_pm2".into(), density_pm2).into(),
        Series::new("los_class".into(), los_class).into(),
        Series::new("triggered_actions".into(), triggered_actions).into(),
    ])?;

    persist_dataframe(path, &mut df)
}

/// Writes a Parquet file atomically via a `.tmp` sibling + rename.
fn persist_dataframe(path: &Path, df: &mut DataFrame) -> Result<()> {
    let tmp_path = path.with_extension("parquet.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        ParquetWriter::new(&mut file)
            .with_compression(ParquetCompression::Snappy)
            .finish(df)?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flagging::{FlagReason, Severity};
    use crate::rulebook::LosClass;
    use tempfile::tempdir;

    fn make_bin() -> Bin {
        Bin {
            bin_id: "S1:0.000-0.100".to_string(),
            segment_id: "S1".to_string(),
            start_km: 0.0,
            end_km: 0.1,
            t_start: 0,
            t_end: 60,
            window_idx: 0,
            count: 3,
            mean_speed_mps: 2.5,
            density_pm2: 0.2,
            rate_p_s: 1.5,
            rate_p_min_per_m: 18.0,
            los_class: LosClass::A,
            events: vec!["full".to_string()],
            schema_key: "default".to_string(),
            width_m: 5.0,
            bin_size_km: 0.1,
            severity: Severity::None,
            flag_reason: FlagReason::None,
            util_percentile: 10.0,
            triggered_actions: vec![],
        }
    }

    #[test]
    fn writes_bins_parquet_without_panicking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bins.parquet");
        let bins = vec![make_bin()];
        let geoms = vec![Vec::new()];
        write_bins_parquet(&path, &bins, &geoms).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rejects_mismatched_geometry_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bins.parquet");
        let bins = vec![make_bin()];
        let err = write_bins_parquet(&path, &bins, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn writes_segment_windows_parquet_without_panicking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segments_from_bins.parquet");
        let rollups = vec![crate::rollup::SegmentWindowRollup {
            segment_id: "S1".to_string(),
            window_idx: 0,
            t_start: 0,
            t_end: 60,
            density_mean: 0.2,
            density_peak: 0.3,
            n_bins: 2,
        }];
        write_segment_windows_parquet(&path, &rollups).unwrap();
        assert!(path.exists());
    }
}
