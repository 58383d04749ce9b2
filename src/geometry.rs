//! Centerline buffering into a bin polygon, plus a manual well-known-binary
//! (WKB) encoder — the teacher never pulls in a geo crate for its own binary
//! framing (`storage/chunk.rs`), so neither do we here.

const WKB_BYTE_ORDER_LE: u8 = 1;
const WKB_TYPE_POLYGON: u32 = 3;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Meters-per-degree of longitude at `lat_deg`, using the standard
/// spherical-earth approximation (matches the precision GPX-derived
/// centerlines already carry).
fn meters_per_degree_lon(lat_deg: f64) -> f64 {
    METERS_PER_DEGREE_LAT * lat_deg.to_radians().cos()
}

/// Linearly interpolates the centerline slice covering `[start_km, end_km]`
/// of a segment whose full length is `length_m`. Returns an empty vec if the
/// centerline has fewer than 2 points or the slice collapses to zero length.
pub fn slice_centerline(centerline: &[(f64, f64)], length_m: f64, start_km: f64, end_km: f64) -> Vec<(f64, f64)> {
    if centerline.len() < 2 || length_m <= 0.0 {
        return Vec::new();
    }
    let start_m = (start_km * 1000.0).clamp(0.0, length_m);
    let end_m = (end_km * 1000.0).clamp(0.0, length_m);
    if end_m <= start_m {
        return Vec::new();
    }

    // Distribute the centerline's vertices proportionally over [0, length_m];
    // the catalog doesn't carry per-vertex cumulative distance, so equal
    // spacing along the polyline is the best available approximation.
    let n = centerline.len();
    let vertex_m = |i: usize| (i as f64 / (n - 1) as f64) * length_m;

    let mut out = Vec::new();
    let interp_at = |m: f64| -> (f64, f64) {
        for i in 0..n - 1 {
            let a_m = vertex_m(i);
            let b_m = vertex_m(i + 1);
            if m >= a_m && m <= b_m {
                let t = if b_m > a_m { (m - a_m) / (b_m - a_m) } else { 0.0 };
                let a = centerline[i];
                let b = centerline[i + 1];
                return (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
            }
        }
        *centerline.last().unwrap()
    };

    out.push(interp_at(start_m));
    for (i, &pt) in centerline.iter().enumerate() {
        let m = vertex_m(i);
        if m > start_m && m < end_m {
            out.push(pt);
        }
    }
    out.push(interp_at(end_m));
    out.dedup();
    out
}

/// Buffers a polyline by `half_width_m` on each side, returning a closed
/// polygon ring (first point repeated at the end, per WKB/GeoJSON convention).
pub fn buffer_polyline(points: &[(f64, f64)], half_width_m: f64) -> Vec<(f64, f64)> {
    if points.len() < 2 || half_width_m <= 0.0 {
        return Vec::new();
    }

    let mut left = Vec::with_capacity(points.len());
    let mut right = Vec::with_capacity(points.len());

    for i in 0..points.len() {
        let (prev, next) = if i == 0 {
            (points[0], points[1])
        } else if i == points.len() - 1 {
            (points[i - 1], points[i])
        } else {
            (points[i - 1], points[i + 1])
        };

        let lat = points[i].1;
        let m_per_deg_lon = meters_per_degree_lon(lat);
        let dx_m = (next.0 - prev.0) * m_per_deg_lon;
        let dy_m = (next.1 - prev.1) * METERS_PER_DEGREE_LAT;
        let seg_len = (dx_m * dx_m + dy_m * dy_m).sqrt();
        if seg_len < 1e-9 {
            left.push(points[i]);
            right.push(points[i]);
            continue;
        }
        // Unit perpendicular, in meters, then converted back to degrees.
        let perp_x_m = -dy_m / seg_len * half_width_m;
        let perp_y_m = dx_m / seg_len * half_width_m;

        let perp_x_deg = perp_x_m / m_per_deg_lon;
        let perp_y_deg = perp_y_m / METERS_PER_DEGREE_LAT;

        left.push((points[i].0 + perp_x_deg, points[i].1 + perp_y_deg));
        right.push((points[i].0 - perp_x_deg, points[i].1 - perp_y_deg));
    }

    let mut ring = left;
    ring.extend(right.into_iter().rev());
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    ring
}

/// Builds a bin's polygon: slices the segment centerline, buffers it by
/// `width_m / 2`, and encodes the result as WKB. Returns an empty vec (the
/// spec's "geometry may be empty" case) when there's no usable centerline.
pub fn bin_polygon_wkb(centerline: &[(f64, f64)], length_m: f64, start_km: f64, end_km: f64, width_m: f64) -> Vec<u8> {
    let slice = slice_centerline(centerline, length_m, start_km, end_km);
    let ring = buffer_polyline(&slice, width_m / 2.0);
    if ring.is_empty() {
        return Vec::new();
    }
    encode_wkb_polygon(&ring)
}

/// Manual little-endian WKB `Polygon` encoder: byte order, geometry type,
/// ring count, point count, then `(x, y)` f64 pairs.
pub fn encode_wkb_polygon(ring: &[(f64, f64)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + 4 + ring.len() * 16);
    buf.push(WKB_BYTE_ORDER_LE);
    buf.extend_from_slice(&WKB_TYPE_POLYGON.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes()); // one ring, no holes
    buf.extend_from_slice(&(ring.len() as u32).to_le_bytes());
    for &(x, y) in ring {
        buf.extend_from_slice(&x.to_le_bytes());
        buf.extend_from_slice(&y.to_le_bytes());
    }
    buf
}
