//! Small numeric helpers shared by the analysis tools
//!
//! Empty inputs return 0.0 rather than NaN so callers can branch on simple
//! comparisons.

use statrs::statistics::{Data, OrderStatistics, Statistics};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.mean()
}

/// Sample standard deviation (n - 1); 0.0 below two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.std_dev()
}

/// Coefficient of variation, 0.0 when the mean is not positive
pub fn cv(values: &[f64]) -> f64 {
    let m = mean(values);
    if m <= 0.0 {
        return 0.0;
    }
    std_dev(values) / m
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Linearly interpolated quantile, `q` in [0, 1]
///
/// Interpolates between adjacent order statistics, so the quartiles of
/// `[1, 2, 3, 4]` are 1.75 and 3.25.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut data = Data::new(values.to_vec());

    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    // order statistics are 1-based
    let low = data.order_statistic(lo + 1);
    let high = data.order_statistic(hi + 1);
    low + (high - low) * frac
}

/// Pearson correlation of two equal-length series
///
/// Returns None when either series is constant or lengths differ.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let dof = (a.len() - 1) as f64;
    let va = a.variance();
    let vb = b.variance();
    if va * dof < 1e-10 || vb * dof < 1e-10 {
        return None;
    }
    Some((a.covariance(b) / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0))
}

/// Sample covariance (n - 1)
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return 0.0;
    }
    a.covariance(b)
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
