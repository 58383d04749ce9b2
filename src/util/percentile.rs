//! Linear-interpolation percentile, matching numpy's default `np.percentile`
//! behavior so results line up with the reference pipeline's cohort math.

/// Computes the `p`th percentile (0..=100) of `values`, sorting in place.
/// Empty input returns 0.0; a single value returns itself regardless of `p`.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if values.len() == 1 {
        return values[0];
    }

    let p = p.clamp(0.0, 100.0);
    let rank = (p / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return values[lo];
    }
    let frac = rank - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slice_is_zero() {
        let mut v: Vec<f64> = vec![];
        assert_eq!(percentile(&mut v, 95.0), 0.0);
    }

    #[test]
    fn p50_of_odd_length_is_median() {
        let mut v = vec![3.0, 1.0, 2.0];
        assert_eq!(percentile(&mut v, 50.0), 2.0);
    }

    #[test]
    fn p100_is_max() {
        let mut v = vec![5.0, 1.0, 9.0, 3.0];
        assert_eq!(percentile(&mut v, 100.0), 9.0);
    }

    #[test]
    fn interpolates_between_ranks() {
        let mut v = vec![1.0, 2.0, 3.0, 4.0];
        // rank = 0.95 * 3 = 2.85 -> interpolate between index 2 (3.0) and 3 (4.0)
        let got = percentile(&mut v, 95.0);
        assert!((got - 3.85).abs() < 1e-9);
    }
}
