//! Correlation-weighted linear signal.
//!
//! Training window: the last `train_window` rows whose forward target is
//! already realised at the as-of date, i.e. rows at least
//! `prediction_horizon` positions before it. Each feature is scored by its
//! Pearson correlation with the target; the strongest `max_features` are
//! kept and combined as a correlation-weighted average of z-scores.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FeatureImportance, FeatureScore, PredictionRecord, PredictiveModel};
use crate::data::TimeSeriesPanel;
use crate::metrics::stats::{mean, pearson, sample_std};

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationModelConfig {
    /// Rows of labelled history used per training.
    pub train_window: usize,
    /// Simulation dates between retrains.
    pub retrain_freq: usize,
    /// Rows between a feature date and its realised target.
    pub prediction_horizon: usize,
    /// Maximum number of features kept per training.
    pub max_features: usize,
    /// Minimum labelled rows required to train.
    pub min_train_samples: usize,
}

impl Default for CorrelationModelConfig {
    fn default() -> Self {
        Self {
            train_window: 756,
            retrain_freq: 42,
            prediction_horizon: 21,
            max_features: 200,
            min_train_samples: 50,
        }
    }
}

#[derive(Debug, Clone)]
struct FittedFeature {
    column: usize,
    correlation: f64,
    mean: f64,
    std: f64,
}

#[derive(Debug, Clone)]
struct FittedModel {
    features: Vec<FittedFeature>,
    target_mean: f64,
    target_std: f64,
}

/// Reference [`PredictiveModel`] implementation.
pub struct CorrelationModel {
    config: CorrelationModelConfig,
    fitted: Option<FittedModel>,
    feature_importance_history: Vec<FeatureImportance>,
    prediction_history: Vec<PredictionRecord>,
}

impl CorrelationModel {
    pub fn new(config: CorrelationModelConfig) -> Self {
        Self {
            config,
            fitted: None,
            feature_importance_history: Vec::new(),
            prediction_history: Vec::new(),
        }
    }

    pub fn config(&self) -> &CorrelationModelConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&self, panel: &TimeSeriesPanel, as_of: NaiveDate) -> Option<FittedModel> {
        let cutoff = panel.rows_through(as_of);
        let labeled_end = cutoff.saturating_sub(self.config.prediction_horizon);
        let start = labeled_end.saturating_sub(self.config.train_window);
        let rows = start..labeled_end;

        let target: Vec<Option<f64>> = panel
            .column_slice(panel.target_index(), rows.clone())
            .collect();
        let present_target: Vec<f64> = target.iter().flatten().copied().collect();
        if present_target.len() < self.config.min_train_samples {
            return None;
        }
        let target_mean = mean(&present_target)?;
        let target_std = sample_std(&present_target)?;

        let mut features = Vec::new();
        for column in panel.feature_indices() {
            let (xs, ys): (Vec<f64>, Vec<f64>) = panel
                .column_slice(column, rows.clone())
                .zip(target.iter())
                .filter_map(|(x, y)| Some((x?, (*y)?)))
                .unzip();
            if xs.len() < self.config.min_train_samples {
                continue;
            }
            let Some(correlation) = pearson(&xs, &ys) else {
                continue;
            };
            let (Some(feature_mean), Some(feature_std)) = (mean(&xs), sample_std(&xs)) else {
                continue;
            };
            features.push(FittedFeature {
                column,
                correlation,
                mean: feature_mean,
                std: feature_std,
            });
        }

        features.sort_by(|a, b| {
            b.correlation
                .abs()
                .total_cmp(&a.correlation.abs())
                .then(a.column.cmp(&b.column))
        });
        features.truncate(self.config.max_features);
        if features.is_empty() {
            return None;
        }

        Some(FittedModel {
            features,
            target_mean,
            target_std,
        })
    }
}

impl PredictiveModel for CorrelationModel {
    fn retrain_freq(&self) -> usize {
        self.config.retrain_freq
    }

    fn train_model(
        &mut self,
        panel: &TimeSeriesPanel,
        as_of: NaiveDate,
        initial_training: bool,
    ) -> bool {
        let Some(fitted) = self.fit(panel, as_of) else {
            debug!(%as_of, initial_training, "Training skipped: insufficient labelled history");
            return false;
        };

        let total: f64 = fitted.features.iter().map(|f| f.correlation.abs()).sum();
        let scores = fitted
            .features
            .iter()
            .map(|f| FeatureScore {
                feature: panel.columns()[f.column].clone(),
                importance: if total > 0.0 {
                    f.correlation.abs() / total
                } else {
                    0.0
                },
            })
            .collect();
        self.feature_importance_history.push(FeatureImportance { as_of, scores });

        if initial_training {
            info!(
                %as_of,
                "Initial training complete with {} features",
                fitted.features.len()
            );
        } else {
            debug!(%as_of, "Retrained with {} features", fitted.features.len());
        }

        self.fitted = Some(fitted);
        true
    }

    fn train_window(&self) -> Option<usize> {
        Some(self.config.train_window)
    }

    fn set_train_window(&mut self, train_window: usize) {
        self.config.train_window = train_window;
    }

    fn predict(&mut self, panel: &TimeSeriesPanel, as_of: NaiveDate) -> Option<f64> {
        let fitted = self.fitted.as_ref()?;
        let row = panel.row_of(as_of)?;

        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        let mut used = 0;
        for feature in &fitted.features {
            if let Some(value) = panel.value(row, feature.column) {
                let z = (value - feature.mean) / feature.std;
                weighted += feature.correlation * z;
                weight_sum += feature.correlation.abs();
                used += 1;
            }
        }
        if used == 0 || weight_sum == 0.0 {
            return None;
        }

        let prediction = fitted.target_mean + fitted.target_std * weighted / weight_sum;
        self.prediction_history.push(PredictionRecord {
            date: as_of,
            prediction,
            features_used: used,
        });
        Some(prediction)
    }

    fn feature_importance_history(&self) -> &[FeatureImportance] {
        &self.feature_importance_history
    }

    fn prediction_history(&self) -> &[PredictionRecord] {
        &self.prediction_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::panel::DEFAULT_TARGET_COLUMN;
    use chrono::Duration;

    /// Panel where `signal` leads the target exactly and `noise` is unrelated.
    fn linear_panel(rows: usize) -> TimeSeriesPanel {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let dates = (0..rows).map(|i| start + Duration::days(i as i64)).collect();
        let values = (0..rows)
            .map(|i| {
                let signal = ((i * 7) % 11) as f64 - 5.0;
                let noise = ((i * 3) % 5) as f64;
                vec![Some(signal), Some(noise), Some(signal * 0.01)]
            })
            .collect();
        TimeSeriesPanel::new(
            vec![
                "signal".to_string(),
                "noise".to_string(),
                DEFAULT_TARGET_COLUMN.to_string(),
            ],
            DEFAULT_TARGET_COLUMN,
            dates,
            values,
        )
        .unwrap()
    }

    fn small_config() -> CorrelationModelConfig {
        CorrelationModelConfig {
            train_window: 60,
            retrain_freq: 5,
            prediction_horizon: 5,
            max_features: 1,
            min_train_samples: 20,
        }
    }

    #[test]
    fn test_default_config() {
        let config = CorrelationModelConfig::default();
        assert_eq!(config.train_window, 756);
        assert_eq!(config.retrain_freq, 42);
        assert_eq!(config.prediction_horizon, 21);
    }

    #[test]
    fn test_untrained_model_does_not_predict() {
        let panel = linear_panel(10);
        let mut model = CorrelationModel::new(small_config());
        assert_eq!(model.predict(&panel, panel.dates()[5]), None);
        assert!(model.prediction_history().is_empty());
    }

    #[test]
    fn test_training_requires_history() {
        let panel = linear_panel(20);
        let mut model = CorrelationModel::new(small_config());
        assert!(!model.train_model(&panel, panel.dates()[19], true));
        assert!(!model.is_trained());
        assert!(model.feature_importance_history().is_empty());
    }

    #[test]
    fn test_selects_the_informative_feature() {
        let panel = linear_panel(100);
        let mut model = CorrelationModel::new(small_config());
        let as_of = panel.dates()[80];
        assert!(model.train_model(&panel, as_of, true));
        assert!(model.is_trained());

        let importance = &model.feature_importance_history()[0];
        assert_eq!(importance.as_of, as_of);
        assert_eq!(importance.scores.len(), 1);
        assert_eq!(importance.scores[0].feature, "signal");
        assert!((importance.scores[0].importance - 1.0).abs() < 1e-12);

        // target is an exact linear function of signal
        let date = panel.dates()[90];
        let prediction = model.predict(&panel, date).unwrap();
        let expected = panel.target_on(date).unwrap();
        assert!((prediction - expected).abs() < 1e-9);
        assert_eq!(model.prediction_history().len(), 1);
    }

    #[test]
    fn test_training_ignores_rows_after_as_of() {
        let panel = linear_panel(100);
        // corrupt everything after row 60: targets no longer follow the signal
        let mut rows = panel.rows().to_vec();
        for row in rows.iter_mut().skip(61) {
            row[2] = Some(-row[0].unwrap() * 0.01);
        }
        let corrupted = panel.with_rows(rows);

        let mut clean = CorrelationModel::new(small_config());
        let mut shifted = CorrelationModel::new(small_config());
        let as_of = panel.dates()[60];
        assert!(clean.train_model(&panel, as_of, false));
        assert!(shifted.train_model(&corrupted, as_of, false));
        assert_eq!(
            clean.feature_importance_history(),
            shifted.feature_importance_history()
        );
    }
}
