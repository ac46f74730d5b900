//! Predictive-model collaborator.
//!
//! The simulation loop drives a [`PredictiveModel`] through its train and
//! predict steps. Training receives the full panel together with the as-of
//! date; implementations are responsible for not reading rows past it.

pub mod correlation;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::TimeSeriesPanel;

pub use correlation::{CorrelationModel, CorrelationModelConfig};

/// Importance score of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub importance: f64,
}

/// Feature importances recorded at one training date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub as_of: NaiveDate,
    pub scores: Vec<FeatureScore>,
}

/// A prediction the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: NaiveDate,
    pub prediction: f64,
    pub features_used: usize,
}

/// Periodically retrained forecasting model.
pub trait PredictiveModel {
    /// Number of simulation dates between retrains.
    fn retrain_freq(&self) -> usize;

    /// Fit the model as of `as_of`. Returns whether training succeeded.
    fn train_model(
        &mut self,
        panel: &TimeSeriesPanel,
        as_of: NaiveDate,
        initial_training: bool,
    ) -> bool;

    /// Rows of history used per training, if the model trains on a window.
    fn train_window(&self) -> Option<usize> {
        None
    }

    /// Resize the training window. Models without one ignore this.
    fn set_train_window(&mut self, _train_window: usize) {}

    /// Forecast for `as_of`, `None` when the model cannot produce one.
    fn predict(&mut self, panel: &TimeSeriesPanel, as_of: NaiveDate) -> Option<f64>;

    /// One importance table per successful training.
    fn feature_importance_history(&self) -> &[FeatureImportance];

    fn prediction_history(&self) -> &[PredictionRecord];
}
