//! Walk-forward backtesting of a periodically retrained signal.
//!
//! - Per-date asset views without lookahead
//! - Retrain/predict/execute loop over the backtest window
//! - Trade records and the lockstep portfolio curve
//! - Progress hooks for callers

pub mod asset_data;
pub mod engine;
pub mod observer;
pub mod trade;

pub use asset_data::{AssetDataBundle, AssetDataConfig, AssetDataPreparer};
pub use engine::{BacktestResult, WalkForwardSimulator, DEFAULT_ASSET_KEY};
pub use observer::{BacktestObserver, NullObserver, TracingObserver};
pub use trade::TradeRecord;
