//! HH:MM wall-clock parsing for runner start lists and event config.

use crate::error::{PipelineError, Result};
use chrono::{NaiveTime, Timelike};

/// Parses `"HH:MM"` or `"HH:MM:SS"` into minutes past midnight.
pub fn parse_hhmm_to_minutes(s: &str) -> Result<f64> {
    let fmt_candidates = ["%H:%M:%S", "%H:%M"];
    for fmt in fmt_candidates {
        if let Ok(t) = NaiveTime::parse_from_str(s.trim(), fmt) {
            return Ok(t.num_seconds_from_midnight() as f64 / 60.0);
        }
    }
    Err(PipelineError::InvalidInput(format!(
        "could not parse time-of-day '{s}' (expected HH:MM or HH:MM:SS)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hh_mm() {
        assert_eq!(parse_hhmm_to_minutes("07:30").unwrap(), 450.0);
    }

    #[test]
    fn parses_hh_mm_ss() {
        assert_eq!(parse_hhmm_to_minutes("07:30:30").unwrap(), 450.5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_hhmm_to_minutes("not-a-time").is_err());
    }
}
