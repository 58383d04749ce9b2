//! C2 — Segment catalog: per-segment geometry/width plus per-event km ranges.

use crate::error::{PipelineError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const MIN_LENGTH_M: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Segment {
    pub segment_id: String,
    pub seg_label: String,
    pub length_m: f64,
    pub width_m: f64,
    pub direction: String,
    pub flow_type: String,
    pub centerline: Vec<(f64, f64)>,
    /// Present events and their (from_km, to_km) range within this segment.
    pub event_ranges: BTreeMap<String, (f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_id: String,
    pub start_time_min: f64,
    pub duration_min: u32,
}

impl Event {
    pub fn start_s(&self) -> f64 {
        self.start_time_min * 60.0
    }
    pub fn duration_s(&self) -> f64 {
        self.duration_min as f64 * 60.0
    }
    pub fn active_window_s(&self) -> (f64, f64) {
        (self.start_s(), self.start_s() + self.duration_s())
    }
}

/// Raw row shape as loaded from the segment CSV, before validation.
#[derive(Debug, Clone)]
pub struct RawSegmentRow {
    pub segment_id: String,
    pub seg_label: String,
    pub width_m: f64,
    pub length_m: f64,
    pub direction: String,
    pub flow_type: String,
    pub centerline: Vec<(f64, f64)>,
    /// event_id -> (present, from_km, to_km)
    pub event_presence: HashMap<String, (bool, f64, f64)>,
}

pub struct SegmentCatalog {
    segments: BTreeMap<String, Segment>,
    events_in_segment: HashMap<String, HashSet<String>>,
    /// km at which the sliced centerline begins on the full course.
    /// Downstream-only (polygon generation); populated from the from_km of
    /// whichever event is present, or 0.0 if none.
    course_offset_km: HashMap<String, f64>,
}

impl SegmentCatalog {
    /// Builds and strictly validates the catalog. Frozen once returned —
    /// callers hold it by shared reference for the rest of the run.
    pub fn build(rows: Vec<RawSegmentRow>, events: &[Event]) -> Result<Self> {
        let event_ids: HashSet<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
        let mut segments = BTreeMap::new();
        let mut events_in_segment = HashMap::new();
        let mut course_offset_km = HashMap::new();

        for row in rows {
            if row.length_m <= MIN_LENGTH_M {
                return Err(PipelineError::InvalidSegment(format!(
                    "segment '{}': length_m must be > 0 (got {})",
                    row.segment_id, row.length_m
                )));
            }
            if row.width_m <= 0.0 {
                return Err(PipelineError::InvalidSegment(format!(
                    "segment '{}': width_m must be > 0 (got {})",
                    row.segment_id, row.width_m
                )));
            }

            let mut event_ranges = BTreeMap::new();
            let mut present_set = HashSet::new();
            let mut first_offset = None;
            for (event_id, (present, from_km, to_km)) in &row.event_presence {
                if !*present {
                    continue;
                }
                if !event_ids.contains(event_id.as_str()) {
                    return Err(PipelineError::InvalidInput(format!(
                        "segment '{}' references unknown event '{}'",
                        row.segment_id, event_id
                    )));
                }
                if !(*from_km < *to_km) {
                    return Err(PipelineError::InvalidSegment(format!(
                        "segment '{}' event '{}': from_km ({}) must be < to_km ({})",
                        row.segment_id, event_id, from_km, to_km
                    )));
                }
                present_set.insert(event_id.clone());
                if first_offset.is_none() {
                    first_offset = Some(*from_km);
                }
                event_ranges.insert(event_id.clone(), (*from_km, *to_km));
            }

            events_in_segment.insert(row.segment_id.clone(), present_set);
            course_offset_km.insert(row.segment_id.clone(), first_offset.unwrap_or(0.0));

            segments.insert(
                row.segment_id.clone(),
                Segment {
                    segment_id: row.segment_id,
                    seg_label: row.seg_label,
                    length_m: row.length_m,
                    width_m: row.width_m,
                    direction: row.direction,
                    flow_type: row.flow_type,
                    centerline: row.centerline,
                    event_ranges,
                },
            );
        }

        Ok(Self {
            segments,
            events_in_segment,
            course_offset_km,
        })
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn get(&self, segment_id: &str) -> Option<&Segment> {
        self.segments.get(segment_id)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn events_in_segment(&self, segment_id: &str) -> Option<&HashSet<String>> {
        self.events_in_segment.get(segment_id)
    }

    pub fn course_offset_km(&self, segment_id: &str) -> f64 {
        self.course_offset_km.get(segment_id).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(id: &str, length_m: f64, width_m: f64) -> RawSegmentRow {
        RawSegmentRow {
            segment_id: id.to_string(),
            seg_label: id.to_string(),
            width_m,
            length_m,
            direction: "out".to_string(),
            flow_type: "open".to_string(),
            centerline: vec![(0.0, 0.0), (0.01, 0.0)],
            event_presence: HashMap::new(),
        }
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        let events = vec![];
        let rows = vec![make_row("S1", 0.0, 5.0)];
        assert!(matches!(
            SegmentCatalog::build(rows, &events),
            Err(PipelineError::InvalidSegment(_))
        ));

        let rows = vec![make_row("S1", 100.0, -1.0)];
        assert!(matches!(
            SegmentCatalog::build(rows, &events),
            Err(PipelineError::InvalidSegment(_))
        ));
    }

    #[test]
    fn builds_valid_catalog() {
        let events = vec![Event {
            event_id: "full".to_string(),
            start_time_min: 420.0,
            duration_min: 210,
        }];
        let mut row = make_row("S1", 1000.0, 5.0);
        row.event_presence
            .insert("full".to_string(), (true, 0.0, 1.0));
        let cat = SegmentCatalog::build(vec![row], &events).unwrap();
        assert_eq!(cat.len(), 1);
        assert!(cat.events_in_segment("S1").unwrap().contains("full"));
    }
}
