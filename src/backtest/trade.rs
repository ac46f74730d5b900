//! Trade records produced by the simulation loop.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One executed trade date.
///
/// Only dates where the portfolio manager accepted the trade produce a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    /// Target weight per asset after the trade.
    pub weights: BTreeMap<String, f64>,
    /// Portfolio return realised for the period.
    pub portfolio_return: f64,
    /// Signal value that drove the trade.
    pub prediction: f64,
    /// Realised target return recorded for the date.
    pub actual_return: Option<f64>,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.portfolio_return > 0.0
    }

    /// Sum of all asset weights (net exposure).
    pub fn net_weight(&self) -> f64 {
        self.weights.values().sum()
    }
}
