//! Fractional-Kelly portfolio manager.
//!
//! Sizes each asset from its signal and volatility:
//! - Signals below the prediction threshold are flattened to zero
//! - Raw size: kelly_fraction * prediction / max(vol, min_volatility)^2
//! - Single position: capped at +/- max_position of capital
//! - Turnover pays transaction_cost per unit of weight changed

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PortfolioManager, TradeExecution, TradeExecutionError};
use crate::backtest::AssetDataBundle;

/// Kelly sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Starting capital.
    pub initial_capital: f64,
    /// Maximum absolute weight per asset.
    pub max_position: f64,
    /// Cost per unit of turnover.
    pub transaction_cost: f64,
    /// Fraction of the full Kelly size to take.
    pub kelly_fraction: f64,
    /// Volatility floor used in the Kelly denominator.
    pub min_volatility: f64,
    /// Absolute signal below which no position is held.
    pub prediction_threshold: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            max_position: 0.02,
            transaction_cost: 0.005,
            kelly_fraction: 0.08,
            min_volatility: 0.03,
            prediction_threshold: 0.01,
        }
    }
}

/// Portfolio manager holding the previous weights for turnover costs.
pub struct KellyPortfolioManager {
    config: KellyConfig,
    current_weights: BTreeMap<String, f64>,
}

impl KellyPortfolioManager {
    pub fn new(config: KellyConfig) -> Self {
        Self {
            config,
            current_weights: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    pub fn current_weights(&self) -> &BTreeMap<String, f64> {
        &self.current_weights
    }

    /// Target weight for a single asset.
    pub fn target_weight(&self, prediction: f64, volatility: f64) -> f64 {
        if prediction.abs() < self.config.prediction_threshold {
            return 0.0;
        }
        let vol = volatility.max(self.config.min_volatility);
        let raw = self.config.kelly_fraction * prediction / (vol * vol);
        raw.clamp(-self.config.max_position, self.config.max_position)
    }
}

impl PortfolioManager for KellyPortfolioManager {
    fn initial_capital(&self) -> f64 {
        self.config.initial_capital
    }

    fn execute_advanced_trades(
        &mut self,
        date: NaiveDate,
        assets: &BTreeMap<String, AssetDataBundle>,
        predictions: &BTreeMap<String, f64>,
        current_capital: f64,
    ) -> Result<TradeExecution, TradeExecutionError> {
        if !(current_capital > 0.0) {
            return Err(TradeExecutionError::NonPositiveCapital(current_capital));
        }

        let mut weights = BTreeMap::new();
        let mut gross_return = 0.0;
        for (asset, &prediction) in predictions {
            let bundle = assets
                .get(asset)
                .ok_or_else(|| TradeExecutionError::MissingAssetData(asset.clone()))?;
            let realized = bundle
                .last_return()
                .ok_or_else(|| TradeExecutionError::NoReturnHistory(asset.clone()))?;

            let weight = self.target_weight(prediction, bundle.volatility);
            gross_return += weight * realized;
            weights.insert(asset.clone(), weight);
        }

        let turnover: f64 = weights
            .iter()
            .map(|(asset, w)| (w - self.current_weights.get(asset).copied().unwrap_or(0.0)).abs())
            .sum::<f64>()
            + self
                .current_weights
                .iter()
                .filter(|(asset, _)| !weights.contains_key(*asset))
                .map(|(_, w)| w.abs())
                .sum::<f64>();

        let period_return = gross_return - self.config.transaction_cost * turnover;
        let new_capital = current_capital * (1.0 + period_return);
        if !new_capital.is_finite() {
            return Err(TradeExecutionError::NonFiniteResult(format!(
                "capital {} with return {}",
                current_capital, period_return
            )));
        }

        debug!(
            %date,
            period_return,
            turnover,
            "Executed trades for {} assets",
            weights.len()
        );

        self.current_weights = weights.clone();
        Ok(TradeExecution {
            new_capital,
            period_return,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bundle(returns: Vec<f64>, volatility: f64) -> AssetDataBundle {
        AssetDataBundle {
            prices: crate::backtest::asset_data::price_series(&returns, 100.0),
            returns,
            volatility,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = KellyConfig::default();
        assert_eq!(config.initial_capital, 1_000_000.0);
        assert_eq!(config.max_position, 0.02);
        assert_eq!(config.kelly_fraction, 0.08);
    }

    #[test]
    fn test_target_weight_threshold_and_cap() {
        let manager = KellyPortfolioManager::new(KellyConfig::default());
        assert_eq!(manager.target_weight(0.005, 0.1), 0.0);
        // 0.08 * 0.05 / 0.1^2 = 0.4, capped at 0.02
        assert_eq!(manager.target_weight(0.05, 0.1), 0.02);
        assert_eq!(manager.target_weight(-0.05, 0.1), -0.02);
    }

    #[test]
    fn test_target_weight_uses_volatility_floor() {
        let config = KellyConfig {
            max_position: 1.0,
            ..Default::default()
        };
        let manager = KellyPortfolioManager::new(config);
        // vol 0.001 is floored to 0.03: 0.08 * 0.01 / 0.0009
        assert_relative_eq!(manager.target_weight(0.01, 0.001), 0.08 * 0.01 / 0.0009);
    }

    #[test]
    fn test_execute_applies_costs() {
        let mut manager = KellyPortfolioManager::new(KellyConfig::default());
        let assets = BTreeMap::from([("spy".to_string(), bundle(vec![0.01, 0.10], 0.05))]);
        let predictions = BTreeMap::from([("spy".to_string(), 0.05)]);

        let exec = manager
            .execute_advanced_trades(date(), &assets, &predictions, 1000.0)
            .unwrap();

        // weight 0.02, gross 0.002, cost 0.005 * 0.02
        assert_relative_eq!(exec.period_return, 0.002 - 0.0001, epsilon = 1e-12);
        assert_relative_eq!(exec.new_capital, 1000.0 * (1.0 + 0.0019), epsilon = 1e-9);
        assert_eq!(exec.weights["spy"], 0.02);
        assert_eq!(manager.current_weights(), &exec.weights);

        // unchanged weight pays no further cost
        let exec = manager
            .execute_advanced_trades(date(), &assets, &predictions, 1000.0)
            .unwrap();
        assert_relative_eq!(exec.period_return, 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_execute_errors() {
        let mut manager = KellyPortfolioManager::new(KellyConfig::default());
        let predictions = BTreeMap::from([("spy".to_string(), 0.05)]);

        let empty = BTreeMap::new();
        assert_eq!(
            manager.execute_advanced_trades(date(), &empty, &predictions, 1000.0),
            Err(TradeExecutionError::MissingAssetData("spy".to_string()))
        );

        let assets = BTreeMap::from([("spy".to_string(), bundle(vec![], 0.02))]);
        assert_eq!(
            manager.execute_advanced_trades(date(), &assets, &predictions, 1000.0),
            Err(TradeExecutionError::NoReturnHistory("spy".to_string()))
        );

        assert_eq!(
            manager.execute_advanced_trades(date(), &assets, &predictions, 0.0),
            Err(TradeExecutionError::NonPositiveCapital(0.0))
        );
    }
}
