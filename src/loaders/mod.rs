//! Input loaders: CSV runner/segment tables, YAML event/rulebook documents.
//! Kept thin and format-ergonomics-focused — out of scope per spec.md §1,
//! present here only to the extent the core needs something to consume.

pub mod events_yaml;
pub mod rulebook_yaml;
pub mod runners_csv;
pub mod segments_csv;

use crate::error::{PipelineError, Result};

/// Looks up a column index by case-insensitive, trimmed header match.
pub(crate) fn column_index(header: &csv::StringRecord, name: &str) -> Result<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| PipelineError::InvalidInput(format!("missing required column '{name}'")))
}

pub(crate) fn optional_column_index(header: &csv::StringRecord, name: &str) -> Option<usize> {
    header.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

pub(crate) fn parse_f64_field(record: &csv::StringRecord, idx: usize, field: &str) -> Result<f64> {
    record
        .get(idx)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| PipelineError::InvalidInput(format!("unparseable float in column '{field}'")))
}
