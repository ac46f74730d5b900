//! Missing-value fill policy.
//!
//! Absent cells stay absent unless a policy is applied. Steps run in the
//! configured order, each one only touching cells still absent after the
//! previous step.

use serde::{Deserialize, Serialize};

use super::panel::TimeSeriesPanel;

/// A single fill step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStep {
    /// Carry the last present value forward.
    Forward,
    /// Carry the next present value backward.
    Backward,
    /// Replace with zero.
    Zero,
}

/// Ordered list of fill steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FillPolicy {
    pub steps: Vec<FillStep>,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            steps: vec![FillStep::Forward, FillStep::Backward, FillStep::Zero],
        }
    }
}

impl FillPolicy {
    /// Policy that leaves every absent cell untouched.
    pub fn none() -> Self {
        Self { steps: Vec::new() }
    }

    /// Apply the policy column by column, returning a new panel.
    pub fn apply(&self, panel: &TimeSeriesPanel) -> TimeSeriesPanel {
        let mut rows = panel.rows().to_vec();
        let width = panel.columns().len();

        for step in &self.steps {
            for col in 0..width {
                match step {
                    FillStep::Forward => {
                        let mut last = None;
                        for row in rows.iter_mut() {
                            match row[col] {
                                Some(v) => last = Some(v),
                                None => row[col] = last,
                            }
                        }
                    }
                    FillStep::Backward => {
                        let mut next = None;
                        for row in rows.iter_mut().rev() {
                            match row[col] {
                                Some(v) => next = Some(v),
                                None => row[col] = next,
                            }
                        }
                    }
                    FillStep::Zero => {
                        for row in rows.iter_mut() {
                            row[col].get_or_insert(0.0);
                        }
                    }
                }
            }
        }

        panel.with_rows(rows)
    }
}
