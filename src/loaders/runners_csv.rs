//! Runner table: `event, runner_id, pace_min_per_km, start_offset_s (optional)`.

use super::{column_index, optional_column_index, parse_f64_field};
use crate::error::Result;
use crate::runner::Runner;
use std::path::Path;

pub fn load_runners(path: &Path) -> Result<Vec<Runner>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let header = rdr.headers()?.clone();
    let idx_event = column_index(&header, "event")?;
    let idx_runner_id = column_index(&header, "runner_id")?;
    let idx_pace = column_index(&header, "pace_min_per_km")?;
    let idx_offset = optional_column_index(&header, "start_offset_s");

    let mut runners = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let event_id = record
            .get(idx_event)
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let runner_id = record.get(idx_runner_id).unwrap_or_default().trim().to_string();
        let pace_min_per_km = parse_f64_field(&record, idx_pace, "pace_min_per_km")?;
        let start_offset_s = match idx_offset {
            Some(i) => parse_f64_field(&record, i, "start_offset_s").unwrap_or(0.0),
            None => 0.0,
        };

        runners.push(Runner {
            runner_id,
            event_id,
            pace_min_per_km,
            start_offset_s,
        });
    }
    Ok(runners)
}
