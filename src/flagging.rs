//! C6 — Flagging engine: LOS-threshold + utilization-percentile predicates,
//! combined into a severity/reason, plus debounced/cooldown trigger firing.

use crate::bins::Bin;
use crate::config::RunConfig;
use crate::rulebook::{FlowThreshold, LosClass, Rulebook, Schema, Trigger};
use crate::util::percentile::percentile;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Watch,
    Caution,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagReason {
    None,
    LosHigh,
    UtilizationHigh,
    Both,
}

struct TriggerState {
    consec_hot: u32,
    consec_cold: u32,
    armed: bool,
}

impl Default for TriggerState {
    fn default() -> Self {
        Self {
            consec_hot: 0,
            consec_cold: 0,
            armed: false,
        }
    }
}

/// Computes util_percentile, flag_reason, severity, and trigger actions for
/// every bin in place. Cohort percentiles are computed per `window_idx`
/// across the whole course, after the full bin set exists — so insertion
/// order of bins never affects the result (spec.md §5).
pub fn flag_bins(bins: &mut [Bin], cfg: &RunConfig, rulebook: &Rulebook) {
    let cohort_pctile = cohort_percentiles_by_window(bins, cfg.utilization_pctile);

    for bin in bins.iter_mut() {
        let threshold = cohort_pctile.get(&bin.window_idx).copied().unwrap_or(f64::INFINITY);
        bin.util_percentile = util_percentile_rank(bin.density_pm2, threshold, cfg.utilization_pctile);

        let bin_len_m = (bin.end_km - bin.start_km) * 1000.0;
        let length_ok = bin_len_m >= cfg.require_min_bin_len_m;

        let los_predicate = length_ok && bin.los_class >= cfg.min_los_flag;
        let utilization_predicate = length_ok && bin.density_pm2 >= threshold;

        let (reason, severity) = match (los_predicate, utilization_predicate) {
            (true, true) => (FlagReason::Both, Severity::Critical),
            (true, false) => (FlagReason::LosHigh, Severity::Caution),
            (false, true) => (FlagReason::UtilizationHigh, Severity::Watch),
            (false, false) => (FlagReason::None, Severity::None),
        };
        bin.flag_reason = reason;
        bin.severity = severity;
    }

    apply_triggers(bins, rulebook);
}

/// p-th percentile of density within each window's course-wide cohort.
fn cohort_percentiles_by_window(bins: &[Bin], p: f64) -> HashMap<usize, f64> {
    let mut by_window: HashMap<usize, Vec<f64>> = HashMap::new();
    for bin in bins {
        by_window.entry(bin.window_idx).or_default().push(bin.density_pm2);
    }
    by_window
        .into_iter()
        .map(|(w, mut values)| (w, percentile(&mut values, p)))
        .collect()
}

/// Scales density against the window's percentile boundary so it reports
/// at `anchor` right at the flag threshold, for downstream display only.
fn util_percentile_rank(density: f64, boundary: f64, anchor: f64) -> f64 {
    if boundary > 0.0 && boundary.is_finite() {
        ((density / boundary) * anchor).min(100.0).max(0.0)
    } else {
        0.0
    }
}

/// Evaluates schema triggers per (segment_id, trigger_id), aggregated at
/// segment granularity per window: a trigger is "hot" for a window if any
/// bin in that segment/window satisfies its `when` clause. Debounce/cooldown
/// counts consecutive hot/cold windows before arming/disarming.
fn apply_triggers(bins: &mut [Bin], rulebook: &Rulebook) {
    let mut by_segment: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, bin) in bins.iter().enumerate() {
        by_segment.entry(bin.segment_id.clone()).or_default().push(i);
    }

    for (_segment_id, indices) in by_segment {
        let schema_key = bins[indices[0]].schema_key.clone();
        let Ok(schema) = rulebook.get_schema(&schema_key) else {
            continue;
        };
        if schema.triggers.is_empty() {
            continue;
        }

        let mut windows: Vec<usize> = indices.clone();
        windows.sort_by_key(|&i| bins[i].window_idx);
        let mut by_window: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in windows {
            by_window.entry(bins[i].window_idx).or_default().push(i);
        }
        let mut ordered_windows: Vec<usize> = by_window.keys().copied().collect();
        ordered_windows.sort_unstable();

        for trigger in &schema.triggers {
            let mut state = TriggerState::default();
            for &w in &ordered_windows {
                let bin_indices = &by_window[&w];
                let worst = bin_indices
                    .iter()
                    .map(|&i| (bins[i].los_class, bins[i].rate_p_min_per_m))
                    .max_by(|a, b| a.0.cmp(&b.0));
                let Some((density_class, flow)) = worst else {
                    continue;
                };
                let hot = trigger_fires(trigger, &schema_key, density_class, flow, schema);

                if hot {
                    state.consec_hot += 1;
                    state.consec_cold = 0;
                    if state.consec_hot >= schema.debounce_bins {
                        state.armed = true;
                    }
                } else {
                    state.consec_cold += 1;
                    state.consec_hot = 0;
                    if state.consec_cold >= schema.cooldown_bins {
                        state.armed = false;
                    }
                }

                if state.armed {
                    for &i in bin_indices {
                        if trigger_fires(trigger, &schema_key, bins[i].los_class, bins[i].rate_p_min_per_m, schema) {
                            bins[i].triggered_actions.extend(trigger.actions.iter().cloned());
                        }
                    }
                }
            }
        }
    }
}

/// Evaluates a trigger's `when` clause against one bin's LOS class and flow
/// rate, independent of debounce state (tracked by the caller per window).
fn trigger_fires(trigger: &Trigger, schema_key: &str, density_class: LosClass, flow: f64, schema: &Schema) -> bool {
    if let Some(required) = &trigger.when.schema
        && required != schema_key
    {
        return false;
    }
    let density_ok = trigger
        .when
        .density_gte
        .is_none_or(|min_letter| density_class >= min_letter);
    let flow_ok = match &trigger.when.flow_gte {
        None => true,
        Some(FlowThreshold::Value(v)) => flow >= *v,
        Some(FlowThreshold::Warn) => schema
            .flow_ref
            .as_ref()
            .and_then(|r| r.warn)
            .is_some_and(|v| flow >= v),
        Some(FlowThreshold::Critical) => schema
            .flow_ref
            .as_ref()
            .and_then(|r| r.critical)
            .is_some_and(|v| flow >= v),
    };
    (trigger.when.density_gte.is_some() || trigger.when.flow_gte.is_some()) && density_ok && flow_ok
}
