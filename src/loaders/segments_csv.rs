//! Segment table: `segment_id, seg_label, width_m, length_m, direction,
//! flow_type`, plus one `{event_id}_present` / `{event_id}_from_km` /
//! `{event_id}_to_km` triple of columns per known event.

use super::{column_index, optional_column_index, parse_f64_field};
use crate::catalog::RawSegmentRow;
use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::path::Path;

pub fn load_segments(path: &Path, event_ids: &[String]) -> Result<Vec<RawSegmentRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let header = rdr.headers()?.clone();
    let idx_segment_id = column_index(&header, "segment_id")?;
    let idx_seg_label = optional_column_index(&header, "seg_label");
    let idx_width = column_index(&header, "width_m")?;
    let idx_length = column_index(&header, "length_m")?;
    let idx_direction = optional_column_index(&header, "direction");
    let idx_flow_type = optional_column_index(&header, "flow_type");

    let per_event_cols: Vec<(String, Option<usize>, Option<usize>, Option<usize>)> = event_ids
        .iter()
        .map(|event_id| {
            (
                event_id.clone(),
                optional_column_index(&header, &format!("{event_id}_present")),
                optional_column_index(&header, &format!("{event_id}_from_km")),
                optional_column_index(&header, &format!("{event_id}_to_km")),
            )
        })
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let segment_id = record.get(idx_segment_id).unwrap_or_default().trim().to_string();
        if segment_id.is_empty() {
            return Err(PipelineError::InvalidInput("segment row missing segment_id".to_string()));
        }
        let seg_label = idx_seg_label
            .and_then(|i| record.get(i))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| segment_id.clone());
        let width_m = parse_f64_field(&record, idx_width, "width_m")?;
        let length_m = parse_f64_field(&record, idx_length, "length_m")?;
        let direction = idx_direction
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .trim()
            .to_string();
        let flow_type = idx_flow_type
            .and_then(|i| record.get(i))
            .unwrap_or("open")
            .trim()
            .to_string();

        let mut event_presence = HashMap::new();
        for (event_id, idx_present, idx_from, idx_to) in &per_event_cols {
            let present = idx_present
                .and_then(|i| record.get(i))
                .map(parse_bool_flag)
                .unwrap_or(false);
            if !present {
                continue;
            }
            let from_km = idx_from
                .map(|i| parse_f64_field(&record, i, &format!("{event_id}_from_km")))
                .transpose()?
                .unwrap_or(0.0);
            let to_km = idx_to
                .map(|i| parse_f64_field(&record, i, &format!("{event_id}_to_km")))
                .transpose()?
                .unwrap_or(length_m / 1000.0);
            event_presence.insert(event_id.clone(), (true, from_km, to_km));
        }

        rows.push(RawSegmentRow {
            segment_id,
            seg_label,
            width_m,
            length_m,
            direction,
            flow_type,
            // GPX-derived centerlines are an external collaborator (spec.md §1);
            // loaders only carry a placeholder until that pipeline stage supplies one.
            centerline: Vec::new(),
            event_presence,
        });
    }
    Ok(rows)
}

fn parse_bool_flag(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y")
}
