//! C7 — Coarsening controller: widens time windows, then bin sizes, until
//! the run fits inside its time/feature budget, preserving hotspot segments.

use crate::bins::{accumulate, Bin};
use crate::catalog::{Event, SegmentCatalog};
use crate::config::RunConfig;
use crate::error::Result;
use crate::rulebook::Rulebook;
use crate::runner::{generate_time_windows, project_runners, Runner};
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    Partial,
}

pub struct CoarsenOutcome {
    pub bins: Vec<Bin>,
    pub status: RunStatus,
    pub final_dt_seconds: u32,
    pub final_bin_size_km: f64,
}

/// Runs C3+C4 repeatedly, widening resolution per spec.md's strategy-step
/// loop, until the attempt fits the time/feature budget or the strategy is
/// exhausted. `started_at` is passed in (rather than taken here) so callers
/// can measure elapsed time from before C3's first projection.
pub fn run_with_coarsening(
    catalog: &SegmentCatalog,
    events: &[Event],
    runners: &[Runner],
    rulebook: &Rulebook,
    cfg: &RunConfig,
    started_at: Instant,
) -> Result<CoarsenOutcome> {
    let mut dt_seconds = cfg.dt_seconds;
    let mut bin_size_km = cfg.bin_size_km;
    let mut strategy_step = 0u32;

    loop {
        let windows = generate_time_windows(events, dt_seconds, cfg);
        let runner_map = project_runners(catalog, events, runners, &windows);

        let bin_len_m = |segment_id: &str| -> f64 {
            let (resolved_bin_km, _resolved_dt) =
                cfg.resolution_for_segment(segment_id, bin_size_km, dt_seconds);
            resolved_bin_km * 1000.0
        };
        let bins = accumulate(catalog, &runner_map, &windows, events, rulebook, bin_len_m)?;

        let elapsed = started_at.elapsed().as_secs_f64();
        let feature_count = bins.len();
        let within_budget = elapsed <= cfg.t_target_s && feature_count <= cfg.feature_cap;

        if within_budget {
            return Ok(CoarsenOutcome {
                bins,
                status: RunStatus::Complete,
                final_dt_seconds: dt_seconds,
                final_bin_size_km: bin_size_km,
            });
        }

        if elapsed > cfg.t_max_s {
            warn!(elapsed, t_max_s = cfg.t_max_s, "coarsening exceeded hard ceiling, emitting partial run");
            return Ok(CoarsenOutcome {
                bins,
                status: RunStatus::Partial,
                final_dt_seconds: dt_seconds,
                final_bin_size_km: bin_size_km,
            });
        }

        match strategy_step {
            0 => {
                dt_seconds = (dt_seconds * 2).min(180);
                strategy_step = 1;
            }
            1 => {
                bin_size_km = bin_size_km.max(0.2);
                strategy_step = 2;
            }
            _ => {
                let budget_err = crate::error::PipelineError::BudgetExceeded { bin_size_km, dt_seconds };
                warn!(feature_count, elapsed, error = %budget_err, "coarsening strategy exhausted, emitting partial run");
                return Ok(CoarsenOutcome {
                    bins,
                    status: RunStatus::Partial,
                    final_dt_seconds: dt_seconds,
                    final_bin_size_km: bin_size_km,
                });
            }
        }
    }
}
