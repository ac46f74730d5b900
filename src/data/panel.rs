//! Date-indexed feature panel.
//!
//! The panel is the single finished input of a backtest: one row per trading
//! date, one column per feature, plus a distinguished target column holding
//! the forward realized return. Missing cells are explicit `None` values.

use std::collections::HashMap;
use std::ops::Range;

use chrono::NaiveDate;
use thiserror::Error;

/// Default name of the forward-return target column.
pub const DEFAULT_TARGET_COLUMN: &str = "ret_21D";

#[derive(Error, Debug, PartialEq)]
pub enum PanelError {
    #[error("Dates are not strictly increasing at row {row}: {previous} then {current}")]
    UnsortedDates {
        row: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("Row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Target column not found: {0}")]
    MissingTarget(String),
}

/// Immutable date-indexed panel of optional feature values.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPanel {
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    target: usize,
    dates: Vec<NaiveDate>,
    /// Row-major cells, `rows[i][j]` is column `j` on `dates[i]`.
    rows: Vec<Vec<Option<f64>>>,
}

impl TimeSeriesPanel {
    /// Build a panel, validating date order, row width and the target column.
    pub fn new(
        columns: Vec<String>,
        target_column: &str,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, PanelError> {
        let mut column_index = HashMap::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            if column_index.insert(name.clone(), idx).is_some() {
                return Err(PanelError::DuplicateColumn(name.clone()));
            }
        }

        let target = *column_index
            .get(target_column)
            .ok_or_else(|| PanelError::MissingTarget(target_column.to_string()))?;

        for (row, window) in dates.windows(2).enumerate() {
            if window[1] <= window[0] {
                return Err(PanelError::UnsortedDates {
                    row: row + 1,
                    previous: window[0],
                    current: window[1],
                });
            }
        }

        for (row, values) in rows.iter().enumerate() {
            if values.len() != columns.len() {
                return Err(PanelError::RowWidth {
                    row,
                    found: values.len(),
                    expected: columns.len(),
                });
            }
        }
        if rows.len() != dates.len() {
            return Err(PanelError::RowWidth {
                row: rows.len().min(dates.len()),
                found: rows.len(),
                expected: dates.len(),
            });
        }

        Ok(Self {
            columns,
            column_index,
            target,
            dates,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn target_column(&self) -> &str {
        &self.columns[self.target]
    }

    pub fn target_index(&self) -> usize {
        self.target
    }

    /// Indices of every non-target column.
    pub fn feature_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.columns.len()).filter(move |&idx| idx != self.target)
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    /// Row index of an exact date.
    pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Number of rows dated on or before `date`.
    pub fn rows_through(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d <= date)
    }

    /// Row range covering `[start, end]` inclusive.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Range<usize> {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end).max(lo);
        lo..hi
    }

    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.get(column).copied().flatten())
    }

    /// Target value on an exact date, `None` if the date is missing or the cell is absent.
    pub fn target_on(&self, date: NaiveDate) -> Option<f64> {
        self.row_of(date).and_then(|row| self.value(row, self.target))
    }

    /// Cells of one column over a row range.
    pub fn column_slice(
        &self,
        column: usize,
        rows: Range<usize>,
    ) -> impl Iterator<Item = Option<f64>> + '_ {
        self.rows[rows].iter().map(move |r| r[column])
    }

    /// Count of absent cells per column.
    pub fn missing_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let missing = self.rows.iter().filter(|r| r[idx].is_none()).count();
                (name.clone(), missing)
            })
            .collect()
    }

    /// Replace the cell matrix, keeping columns and dates.
    pub(crate) fn with_rows(&self, rows: Vec<Vec<Option<f64>>>) -> Self {
        Self {
            columns: self.columns.clone(),
            column_index: self.column_index.clone(),
            target: self.target,
            dates: self.dates.clone(),
            rows,
        }
    }

    pub(crate) fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }
}
