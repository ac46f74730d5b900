//! Small statistics helpers shared by the metrics engine, the asset-data
//! preparer and the reference model.
//!
//! Each helper returns `None` where the statistic is undefined instead of
//! leaking `NaN` to callers.

use statrs::statistics::Statistics;

/// Arithmetic mean, `None` for an empty sample.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.mean())
}

/// Sample standard deviation (n - 1 denominator), `None` below two observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let sd = values.std_dev();
    sd.is_finite().then_some(sd)
}

/// Pearson correlation of two equally long samples.
///
/// `None` when fewer than two pairs exist or either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let sx = x.std_dev();
    let sy = y.std_dev();
    if !(sx > 0.0 && sy > 0.0) {
        return None;
    }
    let corr = x.covariance(y) / (sx * sy);
    corr.is_finite().then(|| corr.clamp(-1.0, 1.0))
}

/// Pairwise percentage change, `values[i] / values[i - 1] - 1`.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}
