//! Walk-forward backtesting of a periodically retrained return signal.
//!
//! - `data`: date-indexed feature/target panel, fill policy and loading
//! - `model`: predictive-model trait and a correlation-weighted reference model
//! - `portfolio`: portfolio-manager trait and fractional-Kelly sizing
//! - `backtest`: asset views, the simulation loop and its progress hooks
//! - `metrics`: performance statistics of a completed run
//! - `report`, `output`: text report and result files

pub mod backtest;
pub mod config;
pub mod data;
pub mod metrics;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod portfolio;
pub mod report;

// Re-export commonly used types
pub use backtest::{
    AssetDataBundle, AssetDataPreparer, BacktestObserver, BacktestResult, TradeRecord,
    WalkForwardSimulator,
};
pub use config::{ConfigError, Settings};
pub use data::{FillPolicy, PanelLoader, TimeSeriesPanel};
pub use metrics::{Metric, MetricsCalculator, PerformanceMetrics};
pub use model::{CorrelationModel, PredictiveModel};
pub use pipeline::{run_strategy, PipelineError, StrategyRun};
pub use portfolio::{KellyPortfolioManager, PortfolioManager, TradeExecutionError};
pub use report::ReportGenerator;
