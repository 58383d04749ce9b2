//! Single immutable configuration threaded through the whole pipeline.
//!
//! Replaces the module-level `FLAGS` singletons the source used to carry
//! around (spec.md Design Notes): everything a run needs is resolved once,
//! frozen into a `RunConfig`, and passed by reference from here on.

use crate::rulebook::LosClass;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Initial time window width, seconds. Widened first by the coarsening controller.
    pub dt_seconds: u32,
    /// Initial bin length, km. Widened second by the coarsening controller.
    pub bin_size_km: f64,
    /// Soft time budget for the whole pipeline, seconds.
    pub t_target_s: f64,
    /// Hard time ceiling, seconds.
    pub t_max_s: f64,
    /// Hard feature-count ceiling.
    pub feature_cap: usize,
    /// Hard ceiling on gzipped GeoJSON size, bytes.
    pub gzip_cap_bytes: u64,
    /// Segments whose (bin_size_km, dt_seconds) are preserved under coarsening.
    pub hotspot_segments: HashSet<String>,
    /// Minimum LOS letter that trips the LOS predicate in the flagging engine.
    pub min_los_flag: LosClass,
    /// Percentile used by the utilization predicate (0..100).
    pub utilization_pctile: f64,
    /// Bins shorter than this are never flagged.
    pub require_min_bin_len_m: f64,
    /// Density cutoff used by the rollup's time-over-threshold metric.
    pub threshold_areal: f64,
    /// Padding before the earliest event start, seconds. Spec default: 1 hour.
    pub lead_padding_s: f64,
    /// Padding after the latest event's active window ends, seconds.
    pub trail_padding_s: f64,
    /// Environment flag gating bin-dataset generation at all (default on).
    pub bin_dataset_enabled: bool,
    /// Deploy-mode flag: when set, bin_size_km is floored toward 0.2 up front.
    pub deploy_mode: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dt_seconds: 60,
            bin_size_km: 0.1,
            t_target_s: 120.0,
            t_max_s: 180.0,
            feature_cap: 10_000,
            gzip_cap_bytes: 15 * 1024 * 1024,
            hotspot_segments: HashSet::new(),
            min_los_flag: LosClass::C,
            utilization_pctile: 95.0,
            require_min_bin_len_m: 10.0,
            threshold_areal: 1.08, // LOS E lower bound in the example rulebook
            lead_padding_s: 3600.0,
            trail_padding_s: 0.0,
            bin_dataset_enabled: true,
            deploy_mode: false,
        }
    }
}

impl RunConfig {
    /// Applies the deploy-mode environment rule: floor bin_size_km toward 0.2
    /// for constrained environments. Read once at run start (spec.md §6).
    pub fn apply_deploy_mode(&mut self) {
        if self.deploy_mode && self.bin_size_km < 0.2 {
            self.bin_size_km = 0.2;
        }
    }

    /// Per-segment resolution override: hotspots always use the run's
    /// original (unwidened) bin_size_km/dt_seconds, even mid-coarsening.
    pub fn resolution_for_segment(
        &self,
        segment_id: &str,
        current_bin_size_km: f64,
        current_dt_seconds: u32,
    ) -> (f64, u32) {
        if self.hotspot_segments.contains(segment_id) {
            (self.bin_size_km, self.dt_seconds)
        } else {
            (current_bin_size_km, current_dt_seconds)
        }
    }
}

/// Reporting-config defaults loaded from YAML (spec.md §6), merged onto a
/// `RunConfig` at load time. LOS colors are presentation-only and dropped
/// here deliberately — the core never emits them.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReportingConfigFile {
    #[serde(default = "default_min_los_flag")]
    pub min_los_flag: LosClass,
    #[serde(default = "default_utilization_pctile")]
    pub utilization_pctile: f64,
    #[serde(default = "default_require_min_bin_len_m")]
    pub require_min_bin_len_m: f64,
}

fn default_min_los_flag() -> LosClass {
    LosClass::C
}
fn default_utilization_pctile() -> f64 {
    95.0
}
fn default_require_min_bin_len_m() -> f64 {
    10.0
}

impl RunConfig {
    pub fn apply_reporting_config(&mut self, cfg: &ReportingConfigFile) {
        self.min_los_flag = cfg.min_los_flag;
        self.utilization_pctile = cfg.utilization_pctile;
        self.require_min_bin_len_m = cfg.require_min_bin_len_m;
    }
}
