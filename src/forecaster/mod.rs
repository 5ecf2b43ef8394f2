//! Next-step reactor temperature forecasting.
//!
//! Trains a bagged regression-tree ensemble over short telemetry windows
//! and predicts the next primary temperature with a confidence band
//! derived from member disagreement, plus a three-way heating
//! recommendation. Model and scaler persist together as one JSON bundle
//! so a later process can load and immediately predict.

pub mod ensemble;
pub mod windows;

use crate::config::defaults::{
    CONFIDENCE_Z, FORECAST_WINDOW, MIN_TRAINING_EXAMPLES, OPTIMAL_TEMP_BAND,
    POOLED_MIN_EXTRACTION, POOLED_SAMPLE_LIMIT, TEST_FRACTION,
};
use crate::config::ModelConfig;
use crate::store::{BatchStore, StoreError};
use crate::types::{Forecast, HeatingAdvice, ProcessSample};
use chrono::Utc;
use ensemble::{
    mean_absolute_error, r2_score, std_deviation, train_test_split, BaggedForest, StandardScaler,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Forecaster failures, surfaced as typed results.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Below the minimum example/sample count for the operation
    #[error("insufficient data: need {required}, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// No in-memory model and no persisted bundle to load
    #[error("model not trained and no persisted model available")]
    NotTrained,

    /// Reading training telemetry failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bundle save/load failed
    #[error("model persistence failed: {0}")]
    Persistence(String),
}

/// Held-out evaluation of a completed training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub examples: usize,
    pub mae: f64,
    pub r2: f64,
}

/// Model + scaler + trained flag, persisted as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelBundle {
    forest: BaggedForest,
    scaler: StandardScaler,
    trained: bool,
}

/// Temperature forecaster over the batch store's telemetry.
pub struct TemperatureForecaster {
    store: Arc<BatchStore>,
    config: ModelConfig,
    bundle: Option<ModelBundle>,
}

impl TemperatureForecaster {
    pub fn new(store: Arc<BatchStore>, config: &ModelConfig) -> Self {
        Self {
            store,
            config: config.clone(),
            bundle: None,
        }
    }

    /// Where the persisted bundle lives.
    pub fn model_path(&self) -> &PathBuf {
        &self.config.model_path
    }

    /// Whether a fitted model is currently in memory.
    pub fn is_trained(&self) -> bool {
        self.bundle.as_ref().is_some_and(|b| b.trained)
    }

    /// Train on one batch's telemetry, or on the pooled telemetry of all
    /// qualified batches when `batch_id` is `None`.
    ///
    /// Requires at least 100 supervised examples. Blocks the caller for
    /// the duration of the fit. On success the fitted bundle replaces
    /// any previous model, in memory and on disk.
    pub fn train(&mut self, batch_id: Option<&str>) -> Result<TrainingReport, ForecastError> {
        let samples = match batch_id {
            Some(id) => self.store.get_process_samples(id)?,
            None => self
                .store
                .pooled_good_samples(POOLED_MIN_EXTRACTION, POOLED_SAMPLE_LIMIT)?,
        };

        let (features, labels) = windows::build_examples(&samples);
        if features.len() < MIN_TRAINING_EXAMPLES {
            warn!(
                examples = features.len(),
                required = MIN_TRAINING_EXAMPLES,
                "Not enough training data; model unchanged"
            );
            return Err(ForecastError::InsufficientData {
                required: MIN_TRAINING_EXAMPLES,
                actual: features.len(),
            });
        }

        let (train_idx, test_idx) =
            train_test_split(features.len(), TEST_FRACTION, self.config.random_state);
        let train_x: Vec<Vec<f64>> = train_idx.iter().map(|&i| features[i].clone()).collect();
        let train_y: Vec<f64> = train_idx.iter().map(|&i| labels[i]).collect();
        let test_y: Vec<f64> = test_idx.iter().map(|&i| labels[i]).collect();

        let scaler = StandardScaler::fit(&train_x);
        let train_x_scaled = scaler.transform(&train_x);

        let forest = BaggedForest::fit(
            &train_x_scaled,
            &train_y,
            self.config.n_estimators,
            self.config.max_depth,
            self.config.random_state,
        );

        let test_pred: Vec<f64> = test_idx
            .iter()
            .map(|&i| forest.predict(&scaler.transform_row(&features[i])))
            .collect();
        let mae = mean_absolute_error(&test_y, &test_pred);
        let r2 = r2_score(&test_y, &test_pred);

        info!(
            examples = features.len(),
            train = train_idx.len(),
            test = test_idx.len(),
            mae,
            r2,
            "Temperature model trained"
        );

        let bundle = ModelBundle {
            forest,
            scaler,
            trained: true,
        };
        if let Err(e) = self.save_bundle(&bundle) {
            // The in-memory model is still usable; a later retrain can
            // persist again.
            warn!(error = %e, path = %self.config.model_path.display(), "Model bundle not persisted");
        }
        self.bundle = Some(bundle);

        Ok(TrainingReport {
            examples: features.len(),
            mae,
            r2,
        })
    }

    /// Predict the next primary temperature from recent telemetry.
    ///
    /// Uses the trailing window of 6 samples. Falls back to the
    /// persisted bundle when no model is in memory; with neither, the
    /// result is [`ForecastError::NotTrained`].
    pub fn predict(&mut self, recent: &[ProcessSample]) -> Result<Forecast, ForecastError> {
        if recent.len() < FORECAST_WINDOW {
            return Err(ForecastError::InsufficientData {
                required: FORECAST_WINDOW,
                actual: recent.len(),
            });
        }

        if self.bundle.is_none() {
            self.load_bundle()?;
        }
        let bundle = self.bundle.as_ref().ok_or(ForecastError::NotTrained)?;
        if !bundle.trained {
            return Err(ForecastError::NotTrained);
        }

        let window = &recent[recent.len() - FORECAST_WINDOW..];
        let features = bundle.scaler.transform_row(&windows::window_features(window));

        let members = bundle.forest.predict_members(&features);
        let predicted = members.iter().sum::<f64>() / members.len() as f64;
        let spread = std_deviation(&members);
        let confidence_interval = (
            predicted - CONFIDENCE_Z * spread,
            predicted + CONFIDENCE_Z * spread,
        );

        let advice = HeatingAdvice::for_temperature(predicted, OPTIMAL_TEMP_BAND);
        info!(
            predicted,
            low = confidence_interval.0,
            high = confidence_interval.1,
            ?advice,
            "Temperature forecast produced"
        );

        Ok(Forecast {
            predicted_temperature: predicted,
            confidence_interval,
            recommendation: advice.text(predicted),
            advice,
            generated_at: Utc::now(),
        })
    }

    /// Load the persisted bundle, replacing any in-memory model.
    ///
    /// A missing artifact maps to [`ForecastError::NotTrained`] so
    /// callers can distinguish "never trained" from real I/O failures.
    pub fn load_bundle(&mut self) -> Result<(), ForecastError> {
        let path = &self.config.model_path;
        if !path.exists() {
            return Err(ForecastError::NotTrained);
        }
        let raw = std::fs::read(path).map_err(|e| ForecastError::Persistence(e.to_string()))?;
        let bundle: ModelBundle =
            serde_json::from_slice(&raw).map_err(|e| ForecastError::Persistence(e.to_string()))?;
        info!(path = %path.display(), "Model bundle loaded");
        self.bundle = Some(bundle);
        Ok(())
    }

    fn save_bundle(&self, bundle: &ModelBundle) -> Result<(), ForecastError> {
        let path = &self.config.model_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ForecastError::Persistence(e.to_string()))?;
            }
        }
        let raw = serde_json::to_vec(bundle).map_err(|e| ForecastError::Persistence(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| ForecastError::Persistence(e.to_string()))?;
        info!(path = %path.display(), "Model bundle saved");
        Ok(())
    }
}
