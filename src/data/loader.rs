//! Panel loader for finished feature files.
//!
//! Reads a parquet or CSV file with one row per trading date:
//! - a date column (`%Y-%m-%d` strings or a polars `Date` column)
//! - any number of numeric feature columns
//! - the forward-return target column (default `ret_21D`)
//!
//! Every non-date column is cast to `Float64`. Nulls become absent cells.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use super::panel::{PanelError, TimeSeriesPanel, DEFAULT_TARGET_COLUMN};

/// Substring used to recognise a target column under a different name.
const TARGET_HINT: &str = "ret_21";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Panel error: {0}")]
    Panel(#[from] PanelError),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Loads a [`TimeSeriesPanel`] from disk.
pub struct PanelLoader {
    path: PathBuf,
    date_column: String,
    target_column: String,
}

impl PanelLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            date_column: "date".to_string(),
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
        }
    }

    pub fn with_date_column(mut self, name: &str) -> Self {
        self.date_column = name.to_string();
        self
    }

    pub fn with_target_column(mut self, name: &str) -> Self {
        self.target_column = name.to_string();
        self
    }

    /// Scan the file lazily based on its extension.
    pub fn load_lazy(&self) -> Result<LazyFrame, LoaderError> {
        if !self.path.exists() {
            return Err(LoaderError::FileNotFound(self.path.display().to_string()));
        }

        let extension = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let lf = match extension.as_str() {
            "parquet" => LazyFrame::scan_parquet(&self.path, ScanArgsParquet::default())?,
            "csv" => LazyCsvReader::new(&self.path).with_has_header(true).finish()?,
            other => return Err(LoaderError::UnsupportedFormat(other.to_string())),
        };
        Ok(lf)
    }

    /// Load the whole file into a panel.
    pub fn load(&self) -> Result<TimeSeriesPanel, LoaderError> {
        let df = self.load_lazy()?.collect()?;
        let panel = dataframe_to_panel(&df, &self.date_column, &self.target_column)?;
        info!(
            "Loaded panel {}: {} dates x {} columns",
            self.path.display(),
            panel.len(),
            panel.columns().len()
        );
        Ok(panel)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Convert days since Unix epoch to NaiveDate.
fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + 719163)
}

/// Pick the column holding the target, falling back to the first name containing `ret_21`.
pub fn resolve_target_column(columns: &[String], requested: &str) -> Option<String> {
    if columns.iter().any(|c| c == requested) {
        return Some(requested.to_string());
    }
    columns
        .iter()
        .find(|c| c.to_lowercase().contains(TARGET_HINT))
        .cloned()
}

fn parse_dates(df: &DataFrame, date_column: &str) -> Result<Vec<Option<NaiveDate>>, LoaderError> {
    let dates_col = df.column(date_column)?;

    // Handle both string and date column types
    if let Ok(str_col) = dates_col.str() {
        Ok(str_col
            .into_iter()
            .map(|s| s.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
            .collect())
    } else if let Ok(date_col) = dates_col.date() {
        Ok(date_col
            .into_iter()
            .map(|d| d.and_then(date_from_days))
            .collect())
    } else {
        Err(LoaderError::InvalidData(format!(
            "{} column has unexpected type {}",
            date_column,
            dates_col.dtype()
        )))
    }
}

/// Convert a DataFrame into a panel.
///
/// Rows are sorted by date. Rows with an unparseable date are dropped and
/// duplicate dates keep their first row.
pub fn dataframe_to_panel(
    df: &DataFrame,
    date_column: &str,
    target_column: &str,
) -> Result<TimeSeriesPanel, LoaderError> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    if !names.iter().any(|n| n == date_column) {
        return Err(LoaderError::InvalidData(format!(
            "Date column not found: {}",
            date_column
        )));
    }

    let value_names: Vec<String> = names.into_iter().filter(|n| n != date_column).collect();
    let resolved_target = resolve_target_column(&value_names, target_column)
        .ok_or_else(|| PanelError::MissingTarget(target_column.to_string()))?;
    if resolved_target != target_column {
        info!("Using {} as target column {}", resolved_target, target_column);
    }

    let dates = parse_dates(df, date_column)?;

    let mut columns_data: Vec<Vec<Option<f64>>> = Vec::with_capacity(value_names.len());
    for name in &value_names {
        let cast = df.column(name)?.cast(&DataType::Float64)?;
        let values: Vec<Option<f64>> = cast
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        columns_data.push(values);
    }

    let mut order: Vec<(NaiveDate, usize)> = dates
        .iter()
        .enumerate()
        .filter_map(|(idx, d)| d.map(|d| (d, idx)))
        .collect();
    let dropped = dates.len() - order.len();
    if dropped > 0 {
        warn!("Dropped {} rows with missing or invalid dates", dropped);
    }
    order.sort_by_key(|(d, idx)| (*d, *idx));

    let mut seen = HashSet::with_capacity(order.len());
    let mut panel_dates = Vec::with_capacity(order.len());
    let mut rows = Vec::with_capacity(order.len());
    let mut duplicates = 0usize;
    for (date, idx) in order {
        if !seen.insert(date) {
            duplicates += 1;
            continue;
        }
        panel_dates.push(date);
        rows.push(columns_data.iter().map(|c| c[idx]).collect::<Vec<_>>());
    }
    if duplicates > 0 {
        warn!("Dropped {} rows with duplicate dates", duplicates);
    }

    let columns: Vec<String> = value_names
        .into_iter()
        .map(|n| {
            if n == resolved_target {
                target_column.to_string()
            } else {
                n
            }
        })
        .collect();

    Ok(TimeSeriesPanel::new(columns, target_column, panel_dates, rows)?)
}
