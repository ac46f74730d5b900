//! Per-asset view of the panel as of a simulation date.
//!
//! Builds the return history, a synthetic compounding price path and a
//! rolling volatility estimate from the target column. Only rows dated on or
//! before the requested date are read.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::TimeSeriesPanel;
use crate::metrics::stats::sample_std;

/// Historical view of one asset handed to the portfolio manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDataBundle {
    /// Present target returns up to and including the as-of date.
    pub returns: Vec<f64>,
    /// Synthetic price path compounded from `returns`.
    pub prices: Vec<f64>,
    /// Rolling volatility of `returns`.
    pub volatility: f64,
}

impl AssetDataBundle {
    /// Most recent return, if any.
    pub fn last_return(&self) -> Option<f64> {
        self.returns.last().copied()
    }
}

/// Volatility and price-path parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetDataConfig {
    /// Base price of the synthetic path.
    pub initial_price: f64,
    /// Rolling volatility window (observations).
    pub volatility_window: usize,
    /// Minimum observations for the rolling estimate.
    pub min_periods: usize,
    /// Volatility used when the history is too short.
    pub default_volatility: f64,
}

impl Default for AssetDataConfig {
    fn default() -> Self {
        Self {
            initial_price: 100.0,
            volatility_window: 63,
            min_periods: 10,
            default_volatility: 0.02,
        }
    }
}

/// Derives [`AssetDataBundle`]s from a panel.
#[derive(Debug, Clone, Default)]
pub struct AssetDataPreparer {
    config: AssetDataConfig,
}

impl AssetDataPreparer {
    pub fn new(config: AssetDataConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssetDataConfig {
        &self.config
    }

    /// Build the bundle for `as_of`. Absent target cells are skipped.
    pub fn prepare(&self, panel: &TimeSeriesPanel, as_of: NaiveDate) -> AssetDataBundle {
        let cutoff = panel.rows_through(as_of);
        let returns: Vec<f64> = panel
            .column_slice(panel.target_index(), 0..cutoff)
            .flatten()
            .collect();

        let prices = price_series(&returns, self.config.initial_price);
        let volatility = rolling_volatility(
            &returns,
            self.config.volatility_window,
            self.config.min_periods,
            self.config.default_volatility,
        );

        AssetDataBundle {
            returns,
            prices,
            volatility,
        }
    }
}

/// Compounding price path `initial * prod(1 + r)`, or `[initial]` for no returns.
pub fn price_series(returns: &[f64], initial_price: f64) -> Vec<f64> {
    if returns.is_empty() {
        return vec![initial_price];
    }
    returns
        .iter()
        .scan(initial_price, |price, r| {
            *price *= 1.0 + r;
            Some(*price)
        })
        .collect()
}

/// Volatility of a return history.
///
/// - at least `window` observations: sample stdev of the last `window`,
///   provided `min_periods` are available
/// - fewer than `window`: sample stdev of the whole history
/// - empty or single observation: `default`
pub fn rolling_volatility(returns: &[f64], window: usize, min_periods: usize, default: f64) -> f64 {
    if window > 0 && returns.len() >= window {
        if window < min_periods {
            return default;
        }
        let tail = &returns[returns.len() - window..];
        return sample_std(tail).unwrap_or(default);
    }
    sample_std(returns).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::panel::tests::{date, sample_panel};
    use approx::assert_relative_eq;

    #[test]
    fn test_price_series_empty() {
        assert_eq!(price_series(&[], 100.0), vec![100.0]);
    }

    #[test]
    fn test_price_series_compounds() {
        let prices = price_series(&[0.1, -0.1], 100.0);
        assert_relative_eq!(prices[0], 110.0, epsilon = 1e-9);
        assert_relative_eq!(prices[1], 99.0, epsilon = 1e-9);
    }

    #[test]
    fn test_volatility_defaults() {
        assert_eq!(rolling_volatility(&[], 63, 10, 0.02), 0.02);
        assert_eq!(rolling_volatility(&[0.5], 63, 10, 0.02), 0.02);
    }

    #[test]
    fn test_volatility_short_history_uses_everything() {
        let returns = [0.01, 0.03, -0.02, 0.04];
        let expected = sample_std(&returns).unwrap();
        assert_relative_eq!(rolling_volatility(&returns, 63, 10, 0.02), expected);
    }

    #[test]
    fn test_volatility_uses_trailing_window() {
        // 10 large moves followed by 63 alternating small ones
        let mut returns = vec![0.5; 10];
        returns.extend((0..63).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }));
        let expected = sample_std(&returns[10..]).unwrap();
        assert_relative_eq!(rolling_volatility(&returns, 63, 10, 0.02), expected);
    }

    #[test]
    fn test_prepare_has_no_lookahead() {
        let panel = sample_panel();
        let preparer = AssetDataPreparer::default();

        // 2021-03-03 has an absent target, so only two returns are visible
        let bundle = preparer.prepare(&panel, date(3));
        assert_eq!(bundle.returns, vec![0.01, -0.02]);
        assert_eq!(bundle.prices.len(), 2);
        assert_eq!(bundle.last_return(), Some(-0.02));

        let before_start = preparer.prepare(&panel, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(before_start.returns.is_empty());
        assert_eq!(before_start.prices, vec![100.0]);
        assert_eq!(before_start.volatility, 0.02);
    }
}
