//! Gzipped GeoJSON feature collection: one feature per bin, geometry built
//! by buffering the segment's centerline slice (empty geometry allowed).

use crate::bins::Bin;
use crate::catalog::SegmentCatalog;
use crate::error::{PipelineError, Result};
use crate::geometry::bin_polygon_wkb;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::io::Write;

use super::SCHEMA_VERSION;

/// Builds the gzipped FeatureCollection bytes for `bins`. Aborts with
/// `DatasetTooLarge` if the row count exceeds `feature_cap` or the gzipped
/// payload exceeds `gzip_cap_bytes` — the coarsening controller is expected
/// to keep this from firing under normal operation (spec.md §4.8).
pub fn build_geojson_gz(
    bins: &[Bin],
    catalog: &SegmentCatalog,
    feature_cap: usize,
    gzip_cap_bytes: u64,
) -> Result<Vec<u8>> {
    if bins.len() > feature_cap {
        return Err(PipelineError::DatasetTooLarge(format!(
            "{} bins exceeds feature cap {}",
            bins.len(),
            feature_cap
        )));
    }

    let features: Vec<Value> = bins.iter().map(|b| feature_for_bin(b, catalog)).collect();
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    let raw = serde_json::to_vec(&collection)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let gz = encoder.finish()?;

    if gz.len() as u64 > gzip_cap_bytes {
        return Err(PipelineError::DatasetTooLarge(format!(
            "gzipped feature collection is {} bytes, exceeds cap {}",
            gz.len(),
            gzip_cap_bytes
        )));
    }

    Ok(gz)
}

fn feature_for_bin(b: &Bin, catalog: &SegmentCatalog) -> Value {
    let geometry = catalog
        .get(&b.segment_id)
        .map(|seg| bin_polygon_wkb(&seg.centerline, seg.length_m, b.start_km, b.end_km, b.width_m))
        .unwrap_or_default();

    let geometry_value = if geometry.is_empty() {
        Value::Null
    } else {
        Value::String(hex_encode(&geometry))
    };

    json!({
        "type": "Feature",
        "geometry": geometry_value,
        "properties": {
            "bin_id": b.bin_id,
            "segment_id": b.segment_id,
            "start_km": b.start_km,
            "end_km": b.end_km,
            "t_start": b.t_start,
            "t_end": b.t_end,
            "window_idx": b.window_idx,
            "density": b.density_pm2,
            "rate": b.rate_p_s,
            "rate_per_m_per_min": b.rate_p_min_per_m,
            "los_class": b.los_class.as_str(),
            "bin_size_km": b.bin_size_km,
            "schema_version": SCHEMA_VERSION,
            "width_m": b.width_m,
            "schema_key": b.schema_key,
            "flag_severity": serde_json::to_value(b.severity).unwrap_or(Value::Null),
            "flag_reason": serde_json::to_value(b.flag_reason).unwrap_or(Value::Null),
            "util_percent": b.util_percentile,
            "util_percentile": b.util_percentile,
            "event": b.events,
        },
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        s.push_str(&format!("{byte:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RawSegmentRow;
    use crate::flagging::{FlagReason, Severity};
    use crate::rulebook::LosClass;
    use std::collections::HashMap;

    fn tiny_catalog() -> SegmentCatalog {
        let row = RawSegmentRow {
            segment_id: "S1".to_string(),
            seg_label: "S1".to_string(),
            width_m: 5.0,
            length_m: 1000.0,
            direction: "out".to_string(),
            flow_type: "open".to_string(),
            centerline: vec![(0.0, 0.0), (0.01, 0.0)],
            event_presence: HashMap::new(),
        };
        SegmentCatalog::build(vec![row], &[]).unwrap()
    }

    fn make_bin() -> Bin {
        Bin {
            bin_id: "S1:0.000-0.100".to_string(),
            segment_id: "S1".to_string(),
            start_km: 0.0,
            end_km: 0.1,
            t_start: 0,
            t_end: 60,
            window_idx: 0,
            count: 3,
            mean_speed_mps: 2.5,
            density_pm2: 0.2,
            rate_p_s: 1.5,
            rate_p_min_per_m: 18.0,
            los_class: LosClass::A,
            events: vec![],
            schema_key: "default".to_string(),
            width_m: 5.0,
            bin_size_km: 0.1,
            severity: Severity::None,
            flag_reason: FlagReason::None,
            util_percentile: 10.0,
            triggered_actions: vec![],
        }
    }

    #[test]
    fn rejects_over_feature_cap() {
        let catalog = tiny_catalog();
        let bins = vec![make_bin(), make_bin()];
        let err = build_geojson_gz(&bins, &catalog, 1, 1024 * 1024).unwrap_err();
        assert!(matches!(err, PipelineError::DatasetTooLarge(_)));
    }

    #[test]
    fn builds_valid_gzip_payload() {
        let catalog = tiny_catalog();
        let bins = vec![make_bin()];
        let gz = build_geojson_gz(&bins, &catalog, 10_000, 15 * 1024 * 1024).unwrap();
        assert_eq!(&gz[0..2], &[0x1f, 0x8b]); // gzip magic
    }
}
