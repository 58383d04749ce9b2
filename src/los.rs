//! C5 — LOS classifier, split out from `rulebook` the way the teacher keeps
//! each analysis rule in its own file under `analysis/rules/`: the banding
//! table lives in the rulebook, but classification is its own concern.

use crate::rulebook::{LosClass, Rulebook};

/// Classifies a density reading against the bands bound to `schema_key`.
/// Thin wrapper over `rulebook::classify_los` so callers depend on `los`
/// for the operation name, and on `rulebook` only for the data it classifies
/// against.
pub fn classify(density_pm2: f64, schema_key: &str, rulebook: &Rulebook) -> crate::error::Result<LosClass> {
    let bands = rulebook.get_bands(schema_key)?;
    Ok(crate::rulebook::classify_los(density_pm2, bands))
}
