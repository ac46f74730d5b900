//! End-to-end strategy run.
//!
//! 1. Resolve the backtest window from the settings and the panel
//! 2. Train the model once at the start date (one retry on a shorter window)
//! 3. Run the walk-forward simulation

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::backtest::{AssetDataPreparer, BacktestObserver, BacktestResult, WalkForwardSimulator};
use crate::config::Settings;
use crate::data::TimeSeriesPanel;
use crate::model::{CorrelationModel, PredictionRecord, PredictiveModel};
use crate::portfolio::KellyPortfolioManager;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Panel has no rows")]
    EmptyPanel,

    #[error("Initial training failed at {date} (train window {train_window})")]
    InitialTrainingFailed { date: NaiveDate, train_window: usize },
}

/// Completed run and the model's prediction log.
#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub result: BacktestResult,
    pub prediction_history: Vec<PredictionRecord>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Backtest window: explicit dates win, otherwise the start sits at
/// `start_fraction` of the panel and the end at its last date.
pub fn resolve_window(
    settings: &Settings,
    panel: &TimeSeriesPanel,
) -> Result<(NaiveDate, NaiveDate), PipelineError> {
    let dates = panel.dates();
    let last = *dates.last().ok_or(PipelineError::EmptyPanel)?;

    let start = match settings.backtest.start_date {
        Some(date) => date,
        None => {
            let index = (dates.len() as f64 * settings.backtest.start_fraction).floor() as usize;
            dates[index.min(dates.len() - 1)]
        }
    };
    let end = settings.backtest.end_date.unwrap_or(last);
    Ok((start, end))
}

/// Train `model` at `start_date`, retrying once with a window of at most
/// half the panel.
pub fn initial_training<M>(
    model: &mut M,
    panel: &TimeSeriesPanel,
    start_date: NaiveDate,
) -> Result<(), PipelineError>
where
    M: PredictiveModel + ?Sized,
{
    if model.train_model(panel, start_date, true) {
        return Ok(());
    }

    let current = model.train_window().unwrap_or(panel.len());
    let reduced = current.min(panel.len() / 2);
    warn!(
        "Initial training failed, retrying with train window {} (was {})",
        reduced, current
    );
    model.set_train_window(reduced);
    if model.train_model(panel, start_date, true) {
        return Ok(());
    }

    Err(PipelineError::InitialTrainingFailed {
        date: start_date,
        train_window: reduced,
    })
}

/// Run the configured strategy over `panel`.
pub fn run_strategy(
    settings: &Settings,
    panel: &TimeSeriesPanel,
    observer: Box<dyn BacktestObserver>,
) -> Result<StrategyRun, PipelineError> {
    let (start_date, end_date) = resolve_window(settings, panel)?;
    info!("Backtest window: {} to {}", start_date, end_date);

    let mut model = CorrelationModel::new(settings.model.clone());
    initial_training(&mut model, panel, start_date)?;

    let mut portfolio_manager = KellyPortfolioManager::new(settings.portfolio.clone());
    let mut simulator = WalkForwardSimulator::new(AssetDataPreparer::new(
        settings.backtest.asset_data.clone(),
    ))
    .with_asset_key(settings.backtest.asset_key.clone())
    .with_observer(observer);

    let result = simulator.run(panel, start_date, end_date, &mut model, &mut portfolio_manager);

    Ok(StrategyRun {
        result,
        prediction_history: model.prediction_history().to_vec(),
        start_date,
        end_date,
    })
}
