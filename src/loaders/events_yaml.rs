//! Event start-time config: `event_id -> { start_time: "HH:MM", duration_min }`.

use crate::catalog::Event;
use crate::error::{PipelineError, Result};
use crate::util::time::parse_hhmm_to_minutes;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawEvent {
    start_time: String,
    duration_min: u32,
}

/// Event order is document order, not alphabetical: `IndexMap` preserves the
/// order `serde_yaml` visits mapping keys in, so the calendar's listed order
/// survives into every bin's `events` roster.
pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    let text = std::fs::read_to_string(path)?;
    let raw: IndexMap<String, RawEvent> = serde_yaml::from_str(&text)?;

    let mut events = Vec::with_capacity(raw.len());
    for (event_id, e) in raw {
        if e.duration_min < 1 {
            return Err(PipelineError::InvalidInput(format!(
                "event '{event_id}': duration_min must be >= 1 (got {})",
                e.duration_min
            )));
        }
        events.push(Event {
            event_id: event_id.to_lowercase(),
            start_time_min: parse_hhmm_to_minutes(&e.start_time)?,
            duration_min: e.duration_min,
        });
    }
    Ok(events)
}
