//! C1 — Rulebook: LOS thresholds, schema bindings, triggers, debounce/cooldown.
//!
//! Pure data + lookup, loaded from YAML (see `loaders::rulebook_yaml`).

use crate::catalog::Segment;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Level-of-service letter grade. `Ord` gives us the `A < B < ... < F`
/// comparison the flagging engine's LOS predicate needs for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LosClass {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl LosClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LosClass::A => "A",
            LosClass::B => "B",
            LosClass::C => "C",
            LosClass::D => "D",
            LosClass::E => "E",
            LosClass::F => "F",
        }
    }
}

impl std::fmt::Display for LosClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LosBand {
    pub letter: LosClass,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowThreshold {
    Warn,
    Critical,
    Value(f64),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowRef {
    pub warn: Option<f64>,
    pub critical: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerWhen {
    pub density_gte: Option<LosClass>,
    pub flow_gte: Option<FlowThreshold>,
    /// Optional schema constraint: trigger only applies when bound to this schema.
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub when: TriggerWhen,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub los_bands: Vec<LosBand>,
    #[serde(default)]
    pub flow_ref: Option<FlowRef>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default = "default_debounce")]
    pub debounce_bins: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_bins: u32,
}

fn default_debounce() -> u32 {
    1
}
fn default_cooldown() -> u32 {
    1
}

/// Binds a segment (by id, or by `segment_type`/`flow_type`) to a schema key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub segment_id: Option<String>,
    pub flow_type: Option<String>,
    pub schema: String,
    /// Lower numbers win when multiple bindings could match the same segment.
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulebookMeta {
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rulebook {
    pub meta: RulebookMeta,
    pub schemas: HashMap<String, Schema>,
    #[serde(default)]
    pub binding: Vec<Binding>,
}

impl Rulebook {
    pub fn validate(&self) -> Result<()> {
        if !self.meta.version.starts_with('2') {
            return Err(PipelineError::BadRulebookBinding(format!(
                "unsupported rulebook meta.version: {}",
                self.meta.version
            )));
        }
        for (key, schema) in &self.schemas {
            if !bands_cover_contiguously(&schema.los_bands) {
                return Err(PipelineError::BadRulebookBinding(format!(
                    "schema '{key}' LOS bands do not cover [0, inf) contiguously"
                )));
            }
        }
        Ok(())
    }

    pub fn get_bands(&self, schema_key: &str) -> Result<&[LosBand]> {
        self.schemas
            .get(schema_key)
            .map(|s| s.los_bands.as_slice())
            .ok_or_else(|| PipelineError::BadRulebookBinding(format!("unknown schema '{schema_key}'")))
    }

    pub fn get_schema(&self, schema_key: &str) -> Result<&Schema> {
        self.schemas
            .get(schema_key)
            .ok_or_else(|| PipelineError::BadRulebookBinding(format!("unknown schema '{schema_key}'")))
    }

    /// Resolves the schema key bound to a segment. Exact `segment_id` bindings
    /// win over `flow_type` bindings; ties broken by lowest `priority`.
    pub fn resolve_schema(&self, segment: &Segment) -> Result<&str> {
        let mut best: Option<&Binding> = None;
        for b in &self.binding {
            let matches_id = b
                .segment_id
                .as_deref()
                .is_some_and(|id| id == segment.segment_id);
            let matches_flow = b
                .flow_type
                .as_deref()
                .is_some_and(|ft| ft == segment.flow_type);
            if !matches_id && !matches_flow {
                continue;
            }
            let better = match best {
                None => true,
                Some(cur) => {
                    // segment_id bindings always beat flow_type-only bindings
                    let cur_is_id = cur.segment_id.is_some();
                    let this_is_id = b.segment_id.is_some();
                    match (this_is_id, cur_is_id) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => b.priority < cur.priority,
                    }
                }
            };
            if better {
                best = Some(b);
            }
        }
        best.map(|b| b.schema.as_str()).ok_or_else(|| {
            PipelineError::BadRulebookBinding(format!(
                "no rulebook binding resolves segment '{}'",
                segment.segment_id
            ))
        })
    }
}

fn bands_cover_contiguously(bands: &[LosBand]) -> bool {
    if bands.is_empty() {
        return false;
    }
    let mut sorted: Vec<&LosBand> = bands.iter().collect();
    sorted.sort_by(|a, b| a.min.partial_cmp(&b.min).unwrap_or(std::cmp::Ordering::Equal));
    if sorted[0].min != 0.0 {
        return false;
    }
    for pair in sorted.windows(2) {
        if (pair[0].max - pair[1].min).abs() > 1e-9 {
            return false;
        }
    }
    true
}

/// Classifies a density value against an ordered band list.
///
/// First band whose `min <= density < max` wins. Below the first band's
/// `min` returns the lowest letter; at/above the last band's `max` returns
/// the highest letter. A tie on an exact `min` boundary goes to the higher
/// band (half-open `[min, max)`).
pub fn classify_los(density: f64, bands: &[LosBand]) -> LosClass {
    debug_assert!(!bands.is_empty());
    let mut sorted: Vec<&LosBand> = bands.iter().collect();
    sorted.sort_by(|a, b| a.min.partial_cmp(&b.min).unwrap_or(std::cmp::Ordering::Equal));

    if density < sorted[0].min {
        return sorted[0].letter;
    }
    for band in &sorted {
        if density >= band.min && density < band.max {
            return band.letter;
        }
    }
    sorted.last().unwrap().letter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bands() -> Vec<LosBand> {
        vec![
            LosBand { letter: LosClass::A, min: 0.0, max: 0.36 },
            LosBand { letter: LosClass::B, min: 0.36, max: 0.54 },
            LosBand { letter: LosClass::C, min: 0.54, max: 0.72 },
            LosBand { letter: LosClass::D, min: 0.72, max: 1.08 },
            LosBand { letter: LosClass::E, min: 1.08, max: 1.63 },
            LosBand { letter: LosClass::F, min: 1.63, max: f64::INFINITY },
        ]
    }

    #[test]
    fn classifies_interior_points() {
        let bands = sample_bands();
        assert_eq!(classify_los(0.002, &bands), LosClass::A);
        assert_eq!(classify_los(0.4, &bands), LosClass::B);
        assert_eq!(classify_los(4.0, &bands), LosClass::F);
    }

    #[test]
    fn boundary_goes_to_next_band() {
        let bands = sample_bands();
        assert_eq!(classify_los(0.36, &bands), LosClass::B);
        assert_eq!(classify_los(1.08, &bands), LosClass::D.max(LosClass::E).min(LosClass::E));
        assert_eq!(classify_los(1.08, &bands), LosClass::E);
    }

    #[test]
    fn below_first_band_is_lowest_letter() {
        let bands = sample_bands();
        assert_eq!(classify_los(-1.0, &bands), LosClass::A);
    }

    #[test]
    fn los_ordering_is_alphabetic() {
        assert!(LosClass::A < LosClass::C);
        assert!(LosClass::F > LosClass::E);
    }
}
