//! Run configuration.
//!
//! One file groups the settings of every component:
//! - `[data]`: panel location, column names and the fill policy
//! - `[backtest]`: window placement and asset-view parameters
//! - `[model]`: training window and retrain cadence
//! - `[portfolio]`: capital and sizing
//! - `[output]`: result directory
//!
//! Files ending in `.json` are read as JSON, anything else as TOML. Missing
//! keys fall back to their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::{AssetDataConfig, DEFAULT_ASSET_KEY};
use crate::data::{FillPolicy, DEFAULT_TARGET_COLUMN};
use crate::model::CorrelationModelConfig;
use crate::portfolio::KellyConfig;

/// Errors from loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Panel source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Parquet or CSV file holding the panel.
    pub path: Option<PathBuf>,
    pub target_column: String,
    pub date_column: String,
    /// Fill steps applied in order before the run.
    pub fill: FillPolicy,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            path: None,
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
            date_column: "date".to_string(),
            fill: FillPolicy::default(),
        }
    }
}

/// Backtest window and asset view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Position of the default start date within the panel (0 = first row).
    pub start_fraction: f64,
    /// Overrides `start_fraction` when set.
    pub start_date: Option<NaiveDate>,
    /// Defaults to the last panel date.
    pub end_date: Option<NaiveDate>,
    pub asset_key: String,
    #[serde(flatten)]
    pub asset_data: AssetDataConfig,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            start_fraction: 0.3,
            start_date: None,
            end_date: None,
            asset_key: DEFAULT_ASSET_KEY.to_string(),
            asset_data: AssetDataConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output/csv_results"),
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub backtest: BacktestSettings,
    pub model: CorrelationModelConfig,
    pub portfolio: KellyConfig,
    pub output: OutputSettings,
}

impl Settings {
    /// Load and validate settings from a TOML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let settings = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Reject values the run cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.portfolio.initial_capital > 0.0) {
            return invalid(format!(
                "portfolio.initial_capital must be positive, got {}",
                self.portfolio.initial_capital
            ));
        }
        if !(self.portfolio.max_position > 0.0) {
            return invalid("portfolio.max_position must be positive".to_string());
        }
        if self.portfolio.transaction_cost < 0.0 {
            return invalid("portfolio.transaction_cost must not be negative".to_string());
        }
        if self.model.train_window == 0 {
            return invalid("model.train_window must be at least 1".to_string());
        }
        if self.backtest.asset_data.volatility_window == 0 {
            return invalid("backtest.volatility_window must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.backtest.start_fraction) {
            return invalid(format!(
                "backtest.start_fraction must be in [0, 1), got {}",
                self.backtest.start_fraction
            ));
        }
        if let (Some(start), Some(end)) = (self.backtest.start_date, self.backtest.end_date) {
            if start > end {
                return invalid(format!("backtest.start_date {} is after end_date {}", start, end));
            }
        }
        if self.data.target_column.is_empty() {
            return invalid("data.target_column must not be empty".to_string());
        }
        Ok(())
    }
}

fn invalid(msg: String) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg))
}
