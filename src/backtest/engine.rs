//! Walk-forward simulation engine.
//!
//! Runs the simulation loop over every panel date in the backtest window:
//! 1. Retrain the model on its cadence
//! 2. Ask the model for a signal (dates without one are skipped)
//! 3. Record the signal and the realised target return
//! 4. Build the asset bundle as of the date
//! 5. Hand the signal to the portfolio manager and record the outcome
//!
//! The portfolio curve and its dates always grow in lockstep.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::TimeSeriesPanel;
use crate::metrics::{MetricsCalculator, PerformanceMetrics};
use crate::model::{FeatureImportance, PredictiveModel};
use crate::portfolio::PortfolioManager;

use super::asset_data::AssetDataPreparer;
use super::observer::{BacktestObserver, NullObserver};
use super::trade::TradeRecord;

/// Asset key used when the panel describes a single target series.
pub const DEFAULT_ASSET_KEY: &str = "primary_asset";

/// Result of a completed walk-forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Capital after each recorded step, starting with the initial capital.
    pub portfolio_values: Vec<f64>,
    /// Date of each entry in `portfolio_values`.
    pub portfolio_dates: Vec<NaiveDate>,
    /// One record per successfully executed trade.
    pub weights_history: Vec<TradeRecord>,
    pub predictions: Vec<f64>,
    /// Realised target return on each signal date (0 when absent).
    pub actual_returns: Vec<f64>,
    pub signal_dates: Vec<NaiveDate>,
    pub metrics: PerformanceMetrics,
    /// Importance tables from every successful training, in order.
    pub feature_importance: Vec<FeatureImportance>,
}

impl BacktestResult {
    pub fn final_value(&self) -> f64 {
        self.portfolio_values.last().copied().unwrap_or(0.0)
    }

    pub fn total_trades(&self) -> usize {
        self.weights_history.len()
    }
}

/// Mutable state owned by a single run.
struct SimulationState {
    capital: f64,
    portfolio_values: Vec<f64>,
    portfolio_dates: Vec<NaiveDate>,
    weights_history: Vec<TradeRecord>,
    predictions: Vec<f64>,
    actual_returns: Vec<f64>,
    signal_dates: Vec<NaiveDate>,
}

impl SimulationState {
    fn new(initial_capital: f64, first_date: NaiveDate) -> Self {
        let mut state = Self {
            capital: initial_capital,
            portfolio_values: Vec::new(),
            portfolio_dates: Vec::new(),
            weights_history: Vec::new(),
            predictions: Vec::new(),
            actual_returns: Vec::new(),
            signal_dates: Vec::new(),
        };
        state.record_value(first_date);
        state
    }

    /// Append the current capital and its date together.
    fn record_value(&mut self, date: NaiveDate) {
        self.portfolio_values.push(self.capital);
        self.portfolio_dates.push(date);
    }

    fn record_signal(&mut self, date: NaiveDate, prediction: f64, actual: f64) {
        self.predictions.push(prediction);
        self.actual_returns.push(actual);
        self.signal_dates.push(date);
    }

    fn last_actual(&self) -> Option<f64> {
        self.actual_returns.last().copied()
    }

    fn into_result(
        self,
        initial_capital: f64,
        feature_importance: Vec<FeatureImportance>,
    ) -> BacktestResult {
        let metrics = MetricsCalculator::compute(
            &self.portfolio_values,
            &self.weights_history,
            &self.predictions,
            &self.actual_returns,
            initial_capital,
        );
        BacktestResult {
            portfolio_values: self.portfolio_values,
            portfolio_dates: self.portfolio_dates,
            weights_history: self.weights_history,
            predictions: self.predictions,
            actual_returns: self.actual_returns,
            signal_dates: self.signal_dates,
            metrics,
            feature_importance,
        }
    }
}

/// Drives a model and a portfolio manager date by date.
pub struct WalkForwardSimulator {
    preparer: AssetDataPreparer,
    asset_key: String,
    observer: Box<dyn BacktestObserver>,
}

impl Default for WalkForwardSimulator {
    fn default() -> Self {
        Self::new(AssetDataPreparer::default())
    }
}

impl WalkForwardSimulator {
    pub fn new(preparer: AssetDataPreparer) -> Self {
        Self {
            preparer,
            asset_key: DEFAULT_ASSET_KEY.to_string(),
            observer: Box::new(NullObserver),
        }
    }

    pub fn with_asset_key(mut self, asset_key: impl Into<String>) -> Self {
        self.asset_key = asset_key.into();
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn BacktestObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the simulation over panel dates in `[start_date, end_date]`.
    ///
    /// The model is handed the full panel on every call; it must not read
    /// rows dated after the as-of date it is given.
    pub fn run<M, P>(
        &mut self,
        panel: &TimeSeriesPanel,
        start_date: NaiveDate,
        end_date: NaiveDate,
        model: &mut M,
        portfolio_manager: &mut P,
    ) -> BacktestResult
    where
        M: PredictiveModel + ?Sized,
        P: PortfolioManager + ?Sized,
    {
        let initial_capital = portfolio_manager.initial_capital();
        let window = &panel.dates()[panel.window(start_date, end_date)];
        self.observer.on_start(window.len(), start_date, end_date);

        let Some(&first_date) = window.first() else {
            let result = SimulationState::new(initial_capital, start_date)
                .into_result(initial_capital, model.feature_importance_history().to_vec());
            self.observer.on_complete(&result);
            return result;
        };

        let mut state = SimulationState::new(initial_capital, first_date);
        let retrain_freq = model.retrain_freq();

        for (i, &date) in window.iter().enumerate() {
            self.observer.on_date(i, date);

            if i.checked_rem(retrain_freq) == Some(0) {
                let success = model.train_model(panel, date, false);
                self.observer.on_retrain(date, success);
            }

            let Some(prediction) = model.predict(panel, date) else {
                continue;
            };
            self.observer.on_prediction(date, prediction);

            let actual = panel.target_on(date).unwrap_or(0.0);
            state.record_signal(date, prediction, actual);

            let bundle = self.preparer.prepare(panel, date);
            let assets = BTreeMap::from([(self.asset_key.clone(), bundle)]);
            let predictions = BTreeMap::from([(self.asset_key.clone(), prediction)]);

            match portfolio_manager.execute_advanced_trades(
                date,
                &assets,
                &predictions,
                state.capital,
            ) {
                Ok(execution) => {
                    self.observer.on_trade_executed(date, &execution);
                    state.capital = execution.new_capital;
                    state.record_value(date);
                    let actual_return = state.last_actual();
                    state.weights_history.push(TradeRecord {
                        date,
                        weights: execution.weights,
                        portfolio_return: execution.period_return,
                        prediction,
                        actual_return,
                    });
                }
                Err(err) => {
                    self.observer.on_trade_failed(date, &err);
                    state.record_value(date);
                }
            }
        }

        let result =
            state.into_result(initial_capital, model.feature_importance_history().to_vec());
        self.observer.on_complete(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::panel::tests::{date, sample_panel};
    use crate::metrics::Metric;
    use crate::model::{FeatureScore, PredictionRecord};
    use crate::portfolio::{TradeExecution, TradeExecutionError};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Predicts a constant, fails training on demand, records what it saw.
    struct ScriptedModel {
        retrain_freq: usize,
        prediction: Option<f64>,
        train_succeeds: bool,
        trained_on: Vec<(NaiveDate, usize)>,
        importance: Vec<FeatureImportance>,
        history: Vec<PredictionRecord>,
    }

    impl ScriptedModel {
        fn new(retrain_freq: usize, prediction: Option<f64>) -> Self {
            Self {
                retrain_freq,
                prediction,
                train_succeeds: true,
                trained_on: Vec::new(),
                importance: Vec::new(),
                history: Vec::new(),
            }
        }
    }

    impl PredictiveModel for ScriptedModel {
        fn retrain_freq(&self) -> usize {
            self.retrain_freq
        }

        fn train_model(&mut self, panel: &TimeSeriesPanel, as_of: NaiveDate, _: bool) -> bool {
            self.trained_on.push((as_of, panel.len()));
            if self.train_succeeds {
                self.importance.push(FeatureImportance {
                    as_of,
                    scores: vec![FeatureScore {
                        feature: "momentum".to_string(),
                        importance: 1.0,
                    }],
                });
            }
            self.train_succeeds
        }

        fn predict(&mut self, _: &TimeSeriesPanel, as_of: NaiveDate) -> Option<f64> {
            let prediction = self.prediction?;
            self.history.push(PredictionRecord {
                date: as_of,
                prediction,
                features_used: 1,
            });
            Some(prediction)
        }

        fn feature_importance_history(&self) -> &[FeatureImportance] {
            &self.importance
        }

        fn prediction_history(&self) -> &[PredictionRecord] {
            &self.history
        }
    }

    /// Grows capital by a fixed return, failing on listed dates.
    struct FixedReturnManager {
        period_return: f64,
        fail_on: Vec<NaiveDate>,
        seen: Vec<(NaiveDate, Vec<f64>)>,
    }

    impl FixedReturnManager {
        fn new(period_return: f64) -> Self {
            Self {
                period_return,
                fail_on: Vec::new(),
                seen: Vec::new(),
            }
        }
    }

    impl PortfolioManager for FixedReturnManager {
        fn initial_capital(&self) -> f64 {
            1000.0
        }

        fn execute_advanced_trades(
            &mut self,
            date: NaiveDate,
            assets: &BTreeMap<String, crate::backtest::AssetDataBundle>,
            predictions: &BTreeMap<String, f64>,
            current_capital: f64,
        ) -> Result<TradeExecution, TradeExecutionError> {
            let bundle = &assets[DEFAULT_ASSET_KEY];
            self.seen.push((date, bundle.returns.clone()));
            if self.fail_on.contains(&date) {
                return Err(TradeExecutionError::Rejected("scripted".to_string()));
            }
            Ok(TradeExecution {
                new_capital: current_capital * (1.0 + self.period_return),
                period_return: self.period_return,
                weights: predictions.keys().map(|k| (k.clone(), 0.5)).collect(),
            })
        }
    }

    #[derive(Default)]
    struct Counts {
        retrains: Vec<(NaiveDate, bool)>,
        failures: usize,
        dates: usize,
    }

    struct CountingObserver(Rc<RefCell<Counts>>);

    impl BacktestObserver for CountingObserver {
        fn on_date(&mut self, _: usize, _: NaiveDate) {
            self.0.borrow_mut().dates += 1;
        }

        fn on_retrain(&mut self, date: NaiveDate, success: bool) {
            self.0.borrow_mut().retrains.push((date, success));
        }

        fn on_trade_failed(&mut self, _: NaiveDate, _: &TradeExecutionError) {
            self.0.borrow_mut().failures += 1;
        }
    }

    #[test]
    fn test_full_run_records_every_step() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(2, Some(0.02));
        let mut manager = FixedReturnManager::new(0.1);
        let result =
            WalkForwardSimulator::default().run(&panel, date(1), date(4), &mut model, &mut manager);

        assert_eq!(result.portfolio_values.len(), 5);
        assert_eq!(result.portfolio_dates, vec![date(1), date(1), date(2), date(3), date(4)]);
        assert!((result.final_value() - 1000.0 * 1.1f64.powi(4)).abs() < 1e-9);
        assert_eq!(result.signal_dates, vec![date(1), date(2), date(3), date(4)]);
        assert_eq!(result.predictions, vec![0.02; 4]);
        // absent target on the 3rd is recorded as 0
        assert_eq!(result.actual_returns, vec![0.01, -0.02, 0.0, 0.03]);
        assert_eq!(result.total_trades(), 4);
        assert_eq!(result.weights_history[1].actual_return, Some(-0.02));
        assert_eq!(result.metrics.get(Metric::NumberOfTrades), Some(4.0));
        assert_eq!(result.feature_importance.len(), 2);
    }

    #[test]
    fn test_failed_trade_keeps_capital_and_lockstep() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(10, Some(0.02));
        let mut manager = FixedReturnManager::new(0.1);
        manager.fail_on.push(date(2));

        let counts = Rc::new(RefCell::new(Counts::default()));
        let mut simulator = WalkForwardSimulator::default()
            .with_observer(Box::new(CountingObserver(counts.clone())));
        let result = simulator.run(&panel, date(1), date(4), &mut model, &mut manager);

        assert_eq!(result.portfolio_values.len(), result.portfolio_dates.len());
        assert_eq!(result.portfolio_values[1], 1100.0);
        assert_eq!(result.portfolio_values[2], 1100.0);
        assert_eq!(result.portfolio_dates[2], date(2));
        assert_eq!(result.weights_history.len(), 3);
        assert!(result.weights_history.iter().all(|t| t.date != date(2)));
        // the signal is still recorded for the failed date
        assert_eq!(result.predictions.len(), 4);
        assert_eq!(counts.borrow().failures, 1);
        assert_eq!(counts.borrow().dates, 4);
    }

    #[test]
    fn test_empty_window_is_degenerate() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(1, Some(0.02));
        model.importance.push(FeatureImportance {
            as_of: date(1),
            scores: Vec::new(),
        });
        let mut manager = FixedReturnManager::new(0.1);
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2022, 2, 1).unwrap();

        let result =
            WalkForwardSimulator::default().run(&panel, start, end, &mut model, &mut manager);

        assert_eq!(result.portfolio_values, vec![1000.0]);
        assert_eq!(result.portfolio_dates, vec![start]);
        assert!(result.predictions.is_empty());
        assert!(result.weights_history.is_empty());
        assert!(result.metrics.is_empty());
        assert_eq!(result.feature_importance.len(), 1);
        assert!(model.trained_on.is_empty());
    }

    #[test]
    fn test_missing_prediction_contributes_nothing() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(1, None);
        let mut manager = FixedReturnManager::new(0.1);
        let result =
            WalkForwardSimulator::default().run(&panel, date(1), date(4), &mut model, &mut manager);

        assert_eq!(result.portfolio_values, vec![1000.0]);
        assert_eq!(result.portfolio_dates, vec![date(1)]);
        assert!(result.signal_dates.is_empty());
        assert!(manager.seen.is_empty());
        assert!(result.metrics.is_empty());
    }

    #[test]
    fn test_retrain_cadence() {
        let panel = sample_panel();
        let counts = Rc::new(RefCell::new(Counts::default()));
        let mut model = ScriptedModel::new(3, Some(0.02));
        model.train_succeeds = false;
        let mut manager = FixedReturnManager::new(0.0);
        let mut simulator = WalkForwardSimulator::default()
            .with_observer(Box::new(CountingObserver(counts.clone())));
        let result = simulator.run(&panel, date(1), date(4), &mut model, &mut manager);

        let trained: Vec<NaiveDate> = model.trained_on.iter().map(|(d, _)| *d).collect();
        assert_eq!(trained, vec![date(1), date(4)]);
        assert_eq!(counts.borrow().retrains, vec![(date(1), false), (date(4), false)]);
        // failed retraining does not stop the loop
        assert_eq!(result.predictions.len(), 4);
    }

    #[test]
    fn test_zero_retrain_freq_never_retrains() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(0, Some(0.02));
        let mut manager = FixedReturnManager::new(0.0);
        WalkForwardSimulator::default().run(&panel, date(1), date(4), &mut model, &mut manager);
        assert!(model.trained_on.is_empty());
    }

    #[test]
    fn test_model_receives_full_panel() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(1, Some(0.02));
        let mut manager = FixedReturnManager::new(0.0);
        WalkForwardSimulator::default().run(&panel, date(1), date(2), &mut model, &mut manager);
        // the train step sees every row, including those after the as-of date
        assert_eq!(model.trained_on, vec![(date(1), 4), (date(2), 4)]);
    }

    #[test]
    fn test_asset_bundle_has_no_lookahead() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(1, Some(0.02));
        let mut manager = FixedReturnManager::new(0.0);
        WalkForwardSimulator::default().run(&panel, date(2), date(4), &mut model, &mut manager);

        assert_eq!(manager.seen[0], (date(2), vec![0.01, -0.02]));
        assert_eq!(manager.seen[1], (date(3), vec![0.01, -0.02]));
        assert_eq!(manager.seen[2], (date(4), vec![0.01, -0.02, 0.03]));
    }

    #[test]
    fn test_custom_asset_key() {
        let panel = sample_panel();
        let mut model = ScriptedModel::new(1, Some(0.02));
        let mut manager = crate::portfolio::KellyPortfolioManager::new(Default::default());
        let result = WalkForwardSimulator::default()
            .with_asset_key("spy")
            .run(&panel, date(1), date(4), &mut model, &mut manager);
        assert!(result.weights_history.iter().all(|t| t.weights.contains_key("spy")));
    }
}
