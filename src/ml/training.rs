//! ML Model Training Pipeline
//!
//! Fits the random forest on the feature table and derives one importance
//! score per training feature.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::RandomForestRegressorParameters;
use tracing::info;

use super::{LoadModel, ModelMetadata, ModelType, RandomForestModel};
use crate::domain::{feature_names, FeatureRow};
use crate::error::{PipelineError, PipelineResult};
use crate::forecast::metrics::ForecastMetrics;

/// Training Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_trees: 400,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn parameters(&self) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            m: None,
            keep_samples: false,
            seed: self.seed,
        }
    }
}

/// Model Trainer
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Fit on the feature table using the declared feature order and `load`
    /// as target.
    pub fn fit_table(&self, rows: &[FeatureRow]) -> PipelineResult<RandomForestModel> {
        let names = feature_names();
        let x = rows
            .iter()
            .map(|r| r.inputs().vector(&names))
            .collect::<PipelineResult<Vec<_>>>()?;
        let y: Vec<f64> = rows.iter().map(|r| r.load).collect();
        self.fit(&x, &y, names)
    }

    /// Fit on an arbitrary table. `feature_names` fixes the column order that
    /// predictions and importances are aligned to.
    pub fn fit(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        feature_names: Vec<String>,
    ) -> PipelineResult<RandomForestModel> {
        let metadata = ModelMetadata::new(ModelType::RandomForest, x.len(), feature_names);
        let mut model = RandomForestModel::fit(x, y, self.config.parameters(), metadata)?;

        let fitted = model.predict(x)?;
        model.metadata.training_metrics = Some(
            ForecastMetrics::calculate(y, &fitted)
                .map_err(|e| PipelineError::Model(e.to_string()))?,
        );

        let scores = permutation_importance(&model, x, y, self.config.seed)?;
        model.set_importances(scores)?;

        info!(
            model_id = %model.metadata.model_id,
            samples = x.len(),
            n_trees = self.config.n_trees,
            "trained random forest"
        );
        Ok(model)
    }
}

fn mse(predicted: &[f64], actual: &[f64]) -> f64 {
    predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / actual.len().max(1) as f64
}

/// Increase in training MSE when each column is shuffled, clamped at zero
/// and normalized to sum to one (all zeros if no column matters).
pub fn permutation_importance(
    model: &dyn LoadModel,
    x: &[Vec<f64>],
    y: &[f64],
    seed: u64,
) -> PipelineResult<Vec<f64>> {
    let n_features = model.feature_names().len();
    let baseline = mse(&model.predict(x)?, y);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut raw = Vec::with_capacity(n_features);
    for j in 0..n_features {
        let mut column: Vec<f64> = x.iter().map(|r| r[j]).collect();
        column.shuffle(&mut rng);

        let permuted: Vec<Vec<f64>> = x
            .iter()
            .zip(&column)
            .map(|(row, v)| {
                let mut row = row.clone();
                row[j] = *v;
                row
            })
            .collect();

        let score = mse(&model.predict(&permuted)?, y) - baseline;
        raw.push(score.max(0.0));
    }

    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        Ok(raw.into_iter().map(|s| s / total).collect())
    } else {
        Ok(raw)
    }
}
