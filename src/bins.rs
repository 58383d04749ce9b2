//! C4 — Bin accumulator: vectorized scatter-add of counts/speeds into
//! (segment × sub-segment × window) cells, plus density/throughput
//! derivation and LOS classification (C5).

use crate::catalog::{Event, SegmentCatalog};
use crate::flagging::{FlagReason, Severity};
use crate::los;
use crate::rulebook::{LosClass, Rulebook};
use crate::runner::{RunnerMap, TimeWindow};

#[derive(Debug, Clone)]
pub struct Bin {
    pub bin_id: String,
    pub segment_id: String,
    pub start_km: f64,
    pub end_km: f64,
    pub t_start: i64,
    pub t_end: i64,
    pub window_idx: usize,
    pub count: u32,
    pub mean_speed_mps: f64,
    pub density_pm2: f64,
    pub rate_p_s: f64,
    pub rate_p_min_per_m: f64,
    pub los_class: LosClass,
    pub events: Vec<String>,
    pub schema_key: String,
    pub width_m: f64,
    pub bin_size_km: f64,

    // Flagging fields (C6), filled in after accumulation.
    pub severity: Severity,
    pub flag_reason: FlagReason,
    pub util_percentile: f64,
    pub triggered_actions: Vec<String>,
}

pub fn n_bins(length_m: f64, bin_len_m: f64) -> usize {
    (length_m / bin_len_m).ceil().max(1.0) as usize
}

fn bin_id(segment_id: &str, start_km: f64, end_km: f64) -> String {
    format!("{segment_id}:{start_km:.3}-{end_km:.3}")
}

/// Builds every bin for every (segment, window) pair. `resolution` returns
/// the effective (bin_size_km, dt_seconds) to emit bins at for a segment
/// (hotspot overrides are applied by the caller before this is invoked —
/// here we only consume the already-resolved `bin_len_m` per segment).
pub fn accumulate(
    catalog: &SegmentCatalog,
    runners: &RunnerMap,
    windows: &[TimeWindow],
    events: &[Event],
    rulebook: &Rulebook,
    bin_len_m_for_segment: impl Fn(&str) -> f64,
) -> crate::error::Result<Vec<Bin>> {
    let mut out = Vec::new();

    for seg in catalog.segments() {
        let bin_len_m = bin_len_m_for_segment(&seg.segment_id);
        let nbins = n_bins(seg.length_m, bin_len_m);
        let schema_key = rulebook.resolve_schema(seg)?.to_string();

        let empty_windows = Vec::new();
        let seg_windows = runners.get(&seg.segment_id).unwrap_or(&empty_windows);

        for window in windows {
            let wr = seg_windows.get(window.index);

            let mut counts = vec![0u32; nbins];
            let mut sum_speed = vec![0.0f64; nbins];

            if let Some(wr) = wr {
                for (pos, speed) in wr.pos_m.iter().zip(wr.speed_mps.iter()) {
                    let clamped = pos.clamp(0.0, (seg.length_m - 1e-6).max(0.0));
                    let idx = ((clamped / bin_len_m) as usize).min(nbins - 1);
                    counts[idx] += 1;
                    sum_speed[idx] += speed;
                }
            }

            let bin_events = active_events_for_window(seg, events, window);

            for b in 0..nbins {
                let start_m = b as f64 * bin_len_m;
                let end_m = ((b + 1) as f64 * bin_len_m).min(seg.length_m);
                let bin_len_m_actual = end_m - start_m;
                let area_m2 = bin_len_m_actual * seg.width_m;

                let count = counts[b];
                let mean_speed = if count > 0 {
                    sum_speed[b] / count as f64
                } else {
                    0.0
                };
                let density = count as f64 / area_m2;
                let rate_p_s = density * seg.width_m * mean_speed;
                let rate_p_min_per_m = rate_p_s * 60.0 / seg.width_m;
                let los_class = los::classify(density, &schema_key, rulebook)?;

                out.push(Bin {
                    bin_id: bin_id(&seg.segment_id, start_m / 1000.0, end_m / 1000.0),
                    segment_id: seg.segment_id.clone(),
                    start_km: start_m / 1000.0,
                    end_km: end_m / 1000.0,
                    t_start: window.t_start,
                    t_end: window.t_end,
                    window_idx: window.index,
                    count,
                    mean_speed_mps: mean_speed,
                    density_pm2: density,
                    rate_p_s,
                    rate_p_min_per_m,
                    los_class,
                    events: bin_events.clone(),
                    schema_key: schema_key.clone(),
                    width_m: seg.width_m,
                    bin_size_km: bin_len_m_actual / 1000.0,
                    severity: Severity::None,
                    flag_reason: FlagReason::None,
                    util_percentile: 0.0,
                    triggered_actions: Vec::new(),
                });
            }
        }
    }

    Ok(out)
}

/// Events whose active window `[start, start+duration)` has non-empty
/// overlap with the bin's `[t_start, t_end]`, restricted to events actually
/// present in the segment, preserved in the event list's insertion order.
fn active_events_for_window(seg: &crate::catalog::Segment, events: &[Event], window: &TimeWindow) -> Vec<String> {
    events
        .iter()
        .filter(|e| seg.event_ranges.contains_key(&e.event_id))
        .filter(|e| {
            let (start, end) = e.active_window_s();
            (window.t_start as f64) < end && (window.t_end as f64) > start
        })
        .map(|e| e.event_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_bins_ceils_partial_tail() {
        assert_eq!(n_bins(1000.0, 100.0), 10);
        assert_eq!(n_bins(1050.0, 100.0), 11);
    }

    #[test]
    fn count_zero_implies_zero_derived_metrics() {
        // direct invariant check on the derivation formulas used above
        let count = 0u32;
        let area = 500.0;
        let density = count as f64 / area;
        assert_eq!(density, 0.0);
    }
}
