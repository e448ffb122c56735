//! Small numeric helpers shared by the curve fit, the marginal-cost math and the
//! scenario engine.
//!
//! Every ratio that can reach user-facing text goes through [`safe_ratio`] so a
//! zero or non-finite denominator yields `None` instead of `inf`/`NaN`.

/// Floor applied to positive spend before raising it to `beta`, so `0^0` never occurs.
pub const SPEND_EPSILON: f64 = 1e-10;

/// Logistic map ℝ → (0, 1), guarded against overflow in `exp`.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Inverse of [`sigmoid`]; the input is clamped away from 0 and 1.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    (p / (1.0 - p)).ln()
}

/// Maps an unconstrained value into `[lo, hi]`.
pub fn to_bounded(u: f64, lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) * sigmoid(u)
}

/// Inverse of [`to_bounded`].
pub fn from_bounded(value: f64, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return 0.0;
    }
    logit((value - lo) / (hi - lo))
}

pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    let r = numerator / denominator;
    r.is_finite().then_some(r)
}

/// Percentage change of `delta` relative to `base`; zero when `base` is not positive.
pub fn percent_of(delta: f64, base: f64) -> f64 {
    if base > 0.0 {
        safe_ratio(delta * 100.0, base).unwrap_or(0.0)
    } else {
        0.0
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round_cents(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_transform_round_trips_inside_range() {
        let (lo, hi) = (0.5, 3.0);
        for v in [0.6, 1.0, 2.2, 2.9] {
            let u = from_bounded(v, lo, hi);
            assert!((to_bounded(u, lo, hi) - v).abs() < 1e-9);
        }
        assert!(to_bounded(1e6, lo, hi) <= hi);
        assert!(to_bounded(-1e6, lo, hi) >= lo);
    }

    #[test]
    fn safe_ratio_guards_denominator() {
        assert_eq!(safe_ratio(1.0, 0.0), None);
        assert_eq!(safe_ratio(1.0, f64::NAN), None);
        assert_eq!(safe_ratio(3.0, 2.0), Some(1.5));
        assert_eq!(percent_of(5.0, 0.0), 0.0);
        assert_eq!(percent_of(5.0, 50.0), 10.0);
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round_cents(10.005_1), 10.01);
        assert_eq!(round_cents(-3.333), -3.33);
    }
}
