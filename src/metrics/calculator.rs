//! Performance metrics calculator.
//!
//! Derives return, risk, forecast-quality and trade statistics from the
//! history accumulated by one simulation run.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::stats::{mean, pct_change, pearson, sample_std};
use crate::backtest::TradeRecord;

/// Trading periods per year.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Named statistic in the metrics mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    TotalReturn,
    AnnualReturn,
    AnnualVolatility,
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    MaxDrawdown,
    WinRate,
    PredictionCorrelation,
    InformationCoefficient,
    PredictionMse,
    DirectionAccuracy,
    NumberOfTrades,
    TradeWinRate,
    AveragePositionSize,
    FinalPortfolioValue,
    InitialCapital,
}

impl Metric {
    pub const ALL: [Metric; 17] = [
        Metric::TotalReturn,
        Metric::AnnualReturn,
        Metric::AnnualVolatility,
        Metric::SharpeRatio,
        Metric::SortinoRatio,
        Metric::CalmarRatio,
        Metric::MaxDrawdown,
        Metric::WinRate,
        Metric::PredictionCorrelation,
        Metric::InformationCoefficient,
        Metric::PredictionMse,
        Metric::DirectionAccuracy,
        Metric::NumberOfTrades,
        Metric::TradeWinRate,
        Metric::AveragePositionSize,
        Metric::FinalPortfolioValue,
        Metric::InitialCapital,
    ];

    /// Key used in reports and serialized output.
    pub fn key(&self) -> &'static str {
        match self {
            Self::TotalReturn => "Total Return (%)",
            Self::AnnualReturn => "Annual Return (%)",
            Self::AnnualVolatility => "Annual Volatility (%)",
            Self::SharpeRatio => "Sharpe Ratio",
            Self::SortinoRatio => "Sortino Ratio",
            Self::CalmarRatio => "Calmar Ratio",
            Self::MaxDrawdown => "Max Drawdown (%)",
            Self::WinRate => "Win Rate (%)",
            Self::PredictionCorrelation => "Prediction Correlation",
            Self::InformationCoefficient => "Information Coefficient",
            Self::PredictionMse => "Prediction MSE",
            Self::DirectionAccuracy => "Direction Accuracy",
            Self::NumberOfTrades => "Number of Trades",
            Self::TradeWinRate => "Trade Win Rate (%)",
            Self::AveragePositionSize => "Average Position Size (%)",
            Self::FinalPortfolioValue => "Final Portfolio Value",
            Self::InitialCapital => "Initial Capital",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fixed mapping of named statistics. Empty when the run was degenerate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>")]
pub struct PerformanceMetrics {
    values: BTreeMap<Metric, f64>,
}

impl PerformanceMetrics {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    /// Value or zero, for display of possibly empty mappings.
    pub fn value_or_zero(&self, metric: Metric) -> f64 {
        self.get(metric).unwrap_or(0.0)
    }

    /// Store a value. Non-finite values are stored as 0.
    pub fn insert(&mut self, metric: Metric, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        self.values.insert(metric, value);
    }

    /// Entries in canonical key order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }
}

impl Serialize for PerformanceMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (metric, value) in &self.values {
            map.serialize_entry(metric.key(), value)?;
        }
        map.end()
    }
}

impl TryFrom<BTreeMap<String, f64>> for PerformanceMetrics {
    type Error = String;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let mut metrics = Self::empty();
        for (key, value) in raw {
            let metric = Metric::from_key(&key).ok_or_else(|| format!("Unknown metric: {}", key))?;
            metrics.insert(metric, value);
        }
        Ok(metrics)
    }
}

/// Forecast-quality statistics on positionally aligned samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PredictionQuality {
    pub correlation: f64,
    pub mse: f64,
    pub direction_accuracy: f64,
    pub samples: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate the full metrics mapping.
    ///
    /// Returns an empty mapping when fewer than two portfolio values exist.
    pub fn compute(
        portfolio_values: &[f64],
        trade_records: &[TradeRecord],
        predictions: &[f64],
        actual_returns: &[f64],
        initial_capital: f64,
    ) -> PerformanceMetrics {
        if portfolio_values.len() < 2 {
            return PerformanceMetrics::empty();
        }
        let returns = pct_change(portfolio_values);

        let first = portfolio_values[0];
        let last = portfolio_values[portfolio_values.len() - 1];
        let total_return = (last / first - 1.0) * 100.0;

        let annual_return = mean(&returns).unwrap_or(0.0) * PERIODS_PER_YEAR * 100.0;
        let annual_volatility = Self::annualized_deviation(&returns);
        let sharpe_ratio = if annual_volatility > 0.0 {
            annual_return / annual_volatility
        } else {
            0.0
        };

        let sortino_ratio = Self::calculate_sortino(&returns, annual_return);

        let max_drawdown = Self::max_drawdown(portfolio_values) * 100.0;
        let calmar_ratio = if max_drawdown != 0.0 {
            annual_return / max_drawdown.abs()
        } else {
            0.0
        };

        // raw fraction, not scaled to percent
        let win_rate = returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64;

        let quality = Self::prediction_quality(predictions, actual_returns);

        let total_trades = trade_records.len();
        let (trade_win_rate, avg_position_size) = if total_trades > 0 {
            let winners = trade_records.iter().filter(|t| t.is_winner()).count();
            let avg_size =
                trade_records.iter().map(|t| t.net_weight()).sum::<f64>() / total_trades as f64;
            (winners as f64 / total_trades as f64 * 100.0, avg_size * 100.0)
        } else {
            (0.0, 0.0)
        };

        let mut metrics = PerformanceMetrics::empty();
        metrics.insert(Metric::TotalReturn, total_return);
        metrics.insert(Metric::AnnualReturn, annual_return);
        metrics.insert(Metric::AnnualVolatility, annual_volatility);
        metrics.insert(Metric::SharpeRatio, sharpe_ratio);
        metrics.insert(Metric::SortinoRatio, sortino_ratio);
        metrics.insert(Metric::CalmarRatio, calmar_ratio);
        metrics.insert(Metric::MaxDrawdown, max_drawdown);
        metrics.insert(Metric::WinRate, win_rate);
        metrics.insert(Metric::PredictionCorrelation, quality.correlation);
        metrics.insert(Metric::InformationCoefficient, quality.correlation);
        metrics.insert(Metric::PredictionMse, quality.mse);
        metrics.insert(Metric::DirectionAccuracy, quality.direction_accuracy);
        metrics.insert(Metric::NumberOfTrades, total_trades as f64);
        metrics.insert(Metric::TradeWinRate, trade_win_rate);
        metrics.insert(Metric::AveragePositionSize, avg_position_size);
        metrics.insert(Metric::FinalPortfolioValue, last);
        metrics.insert(Metric::InitialCapital, initial_capital);
        metrics
    }

    /// Annualized sample deviation in percent, 0 below two observations.
    fn annualized_deviation(returns: &[f64]) -> f64 {
        sample_std(returns)
            .map(|sd| sd * PERIODS_PER_YEAR.sqrt() * 100.0)
            .unwrap_or(0.0)
    }

    /// Sortino ratio against the deviation of negative period returns.
    fn calculate_sortino(returns: &[f64], annual_return: f64) -> f64 {
        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        if downside.is_empty() {
            return 0.0;
        }
        let downside_dev = Self::annualized_deviation(&downside);
        if downside_dev > 0.0 {
            annual_return / downside_dev
        } else {
            0.0
        }
    }

    /// Most negative drawdown from the running peak, as a fraction (<= 0).
    pub fn max_drawdown(values: &[f64]) -> f64 {
        let mut peak = f64::NEG_INFINITY;
        let mut worst = 0.0f64;
        for &value in values {
            peak = peak.max(value);
            if peak > 0.0 {
                worst = worst.min((value - peak) / peak);
            }
        }
        worst
    }

    /// Correlation, MSE and direction hit rate after truncating both
    /// sequences to their shared length. Alignment is by position only.
    pub fn prediction_quality(predictions: &[f64], actual_returns: &[f64]) -> PredictionQuality {
        let n = predictions.len().min(actual_returns.len());
        if n == 0 {
            return PredictionQuality::default();
        }
        let predicted = &predictions[..n];
        let actual = &actual_returns[..n];

        let correlation = if n > 1 {
            pearson(predicted, actual).unwrap_or(0.0)
        } else {
            0.0
        };

        let mse = predicted
            .iter()
            .zip(actual)
            .map(|(p, a)| (a - p).powi(2))
            .sum::<f64>()
            / n as f64;

        let hits = predicted
            .iter()
            .zip(actual)
            .filter(|(p, a)| (**p > 0.0) == (**a > 0.0))
            .count();

        PredictionQuality {
            correlation,
            mse,
            direction_accuracy: hits as f64 / n as f64,
            samples: n,
        }
    }
}
