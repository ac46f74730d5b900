//! Result persistence.
//!
//! Writes one CSV per history through polars and the whole
//! [`BacktestResult`] as JSON, so a run can be reported again later.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::backtest::BacktestResult;
use crate::model::PredictionRecord;

pub const PORTFOLIO_FILE: &str = "portfolio_results.csv";
pub const METRICS_FILE: &str = "performance_metrics.csv";
pub const WEIGHTS_FILE: &str = "weights_history.csv";
pub const PREDICTIONS_FILE: &str = "prediction_history.csv";
pub const FEATURE_IMPORTANCE_FILE: &str = "feature_importance_history.csv";
pub const RESULT_FILE: &str = "backtest_result.json";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes run artifacts into a directory.
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every artifact. Returns the paths written.
    pub fn write_all(
        &self,
        result: &BacktestResult,
        prediction_history: &[PredictionRecord],
    ) -> Result<Vec<PathBuf>, OutputError> {
        fs::create_dir_all(&self.dir)?;

        let mut written = vec![
            self.write_csv(PORTFOLIO_FILE, &mut portfolio_frame(result)?)?,
            self.write_csv(METRICS_FILE, &mut metrics_frame(result)?)?,
            self.write_csv(WEIGHTS_FILE, &mut weights_frame(result)?)?,
            self.write_csv(PREDICTIONS_FILE, &mut predictions_frame(prediction_history)?)?,
            self.write_csv(FEATURE_IMPORTANCE_FILE, &mut importance_frame(result)?)?,
        ];

        let json_path = self.dir.join(RESULT_FILE);
        fs::write(&json_path, serde_json::to_string_pretty(result)?)?;
        written.push(json_path);

        info!("Saved {} result files to {}", written.len(), self.dir.display());
        Ok(written)
    }

    fn write_csv(&self, name: &str, df: &mut DataFrame) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(name);
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
        Ok(path)
    }
}

/// Read a result previously written by [`ResultWriter::write_all`].
pub fn load_result(path: impl AsRef<Path>) -> Result<BacktestResult, OutputError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn portfolio_frame(result: &BacktestResult) -> PolarsResult<DataFrame> {
    let dates: Vec<String> = result.portfolio_dates.iter().map(|d| d.to_string()).collect();
    df!(
        "date" => dates,
        "portfolio_value" => result.portfolio_values.clone(),
    )
}

/// Single row, one column per metric.
fn metrics_frame(result: &BacktestResult) -> PolarsResult<DataFrame> {
    let columns: Vec<Column> = result
        .metrics
        .iter()
        .map(|(metric, value)| Column::new(metric.key().into(), [value]))
        .collect();
    DataFrame::new(columns)
}

/// One row per asset per executed trade.
fn weights_frame(result: &BacktestResult) -> PolarsResult<DataFrame> {
    let mut dates = Vec::new();
    let mut assets = Vec::new();
    let mut weights = Vec::new();
    let mut returns = Vec::new();
    let mut predictions = Vec::new();
    let mut actuals = Vec::new();

    for record in &result.weights_history {
        for (asset, weight) in &record.weights {
            dates.push(record.date.to_string());
            assets.push(asset.clone());
            weights.push(*weight);
            returns.push(record.portfolio_return);
            predictions.push(record.prediction);
            actuals.push(record.actual_return);
        }
    }

    df!(
        "date" => dates,
        "asset" => assets,
        "weight" => weights,
        "portfolio_return" => returns,
        "prediction" => predictions,
        "actual_return" => actuals,
    )
}

fn predictions_frame(history: &[PredictionRecord]) -> PolarsResult<DataFrame> {
    df!(
        "date" => history.iter().map(|r| r.date.to_string()).collect::<Vec<_>>(),
        "prediction" => history.iter().map(|r| r.prediction).collect::<Vec<_>>(),
        "features_used" => history.iter().map(|r| r.features_used as i64).collect::<Vec<_>>(),
    )
}

fn importance_frame(result: &BacktestResult) -> PolarsResult<DataFrame> {
    let mut as_of = Vec::new();
    let mut features = Vec::new();
    let mut importance = Vec::new();
    for table in &result.feature_importance {
        for score in &table.scores {
            as_of.push(table.as_of.to_string());
            features.push(score.feature.clone());
            importance.push(score.importance);
        }
    }
    df!(
        "as_of" => as_of,
        "feature" => features,
        "importance" => importance,
    )
}
