//! Performance metrics module.
//!
//! - Return and risk statistics of the portfolio curve
//! - Sharpe, Sortino and Calmar ratios
//! - Maximum drawdown
//! - Forecast quality of the signal against realised returns
//! - Trade statistics

pub mod calculator;
pub mod stats;

pub use calculator::{Metric, MetricsCalculator, PerformanceMetrics, PredictionQuality};
