//! Progress hooks for the simulation loop.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::portfolio::{TradeExecution, TradeExecutionError};

use super::engine::BacktestResult;

/// Receives progress events from a running simulation.
///
/// Every method defaults to a no-op.
pub trait BacktestObserver {
    fn on_start(&mut self, _dates: usize, _start: NaiveDate, _end: NaiveDate) {}

    /// Called once per window date, before any other event for that date.
    fn on_date(&mut self, _index: usize, _date: NaiveDate) {}

    fn on_retrain(&mut self, _date: NaiveDate, _success: bool) {}

    fn on_prediction(&mut self, _date: NaiveDate, _prediction: f64) {}

    fn on_trade_executed(&mut self, _date: NaiveDate, _execution: &TradeExecution) {}

    fn on_trade_failed(&mut self, _date: NaiveDate, _error: &TradeExecutionError) {}

    fn on_complete(&mut self, _result: &BacktestResult) {}
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl BacktestObserver for NullObserver {}

/// Emits events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BacktestObserver for TracingObserver {
    fn on_start(&mut self, dates: usize, start: NaiveDate, end: NaiveDate) {
        info!("Running backtest from {} to {} ({} dates)", start, end, dates);
    }

    fn on_retrain(&mut self, date: NaiveDate, success: bool) {
        if success {
            debug!(%date, "Model retrained");
        } else {
            warn!(%date, "Model retraining failed, keeping previous fit");
        }
    }

    fn on_trade_failed(&mut self, date: NaiveDate, error: &TradeExecutionError) {
        warn!(%date, "Trade execution failed: {}", error);
    }

    fn on_complete(&mut self, result: &BacktestResult) {
        info!(
            "Backtest complete: {} signals, {} trades, final value {:.2}",
            result.predictions.len(),
            result.total_trades(),
            result.final_value()
        );
    }
}
