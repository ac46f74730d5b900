//! Portfolio-manager collaborator.
//!
//! The simulation loop only sees the [`PortfolioManager`] trait. Trade sizing
//! and execution live behind it; a failed execution is a tagged error the loop
//! absorbs per date.

pub mod kelly;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::backtest::AssetDataBundle;

pub use kelly::{KellyConfig, KellyPortfolioManager};

/// Outcome of a successful trade execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeExecution {
    pub new_capital: f64,
    pub period_return: f64,
    pub weights: BTreeMap<String, f64>,
}

/// Reasons a portfolio manager refuses or fails to trade on a date.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeExecutionError {
    #[error("Capital must be positive, got {0}")]
    NonPositiveCapital(f64),

    #[error("No asset data for {0}")]
    MissingAssetData(String),

    #[error("No return history for {0}")]
    NoReturnHistory(String),

    #[error("Non-finite result: {0}")]
    NonFiniteResult(String),

    #[error("Execution rejected: {0}")]
    Rejected(String),
}

/// Trade sizing and execution.
pub trait PortfolioManager {
    /// Capital the run starts with.
    fn initial_capital(&self) -> f64;

    /// Size and execute trades for `date`.
    ///
    /// `assets` and `predictions` are keyed by asset name.
    fn execute_advanced_trades(
        &mut self,
        date: NaiveDate,
        assets: &BTreeMap<String, AssetDataBundle>,
        predictions: &BTreeMap<String, f64>,
        current_capital: f64,
    ) -> Result<TradeExecution, TradeExecutionError>;
}
