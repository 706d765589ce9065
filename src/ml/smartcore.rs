//! SmartCore ML Model Wrapper
//!
//! Wraps SmartCore's `RandomForestRegressor` as a [`LoadModel`] and persists
//! it, together with its metadata and feature importances, as a single
//! bincode artifact.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::info;

use super::models::check_width;
use super::{LoadModel, ModelMetadata};
use crate::domain::FeatureImportance;
use crate::error::{PipelineError, PipelineResult};
use crate::store::table::{stage_bytes, Staged};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fitted random forest plus everything needed to reuse it in a later process.
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub metadata: ModelMetadata,
    /// One entry per feature, in `metadata.feature_names` order.
    pub importances: Vec<FeatureImportance>,
    /// Training parameters for reproducibility
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub seed: u64,
    forest: Forest,
}

/// Row-major dense matrix from equal-width rows.
pub(crate) fn to_matrix(rows: &[Vec<f64>]) -> PipelineResult<DenseMatrix<f64>> {
    let n_features = rows.first().map(Vec::len).unwrap_or(0);
    check_width(rows, n_features)?;

    let mut flat = Vec::with_capacity(rows.len() * n_features);
    for row in rows {
        flat.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(rows.len(), n_features, flat, false))
}

impl RandomForestModel {
    /// Fit a forest on row-major `x` and target `y`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        params: RandomForestRegressorParameters,
        metadata: ModelMetadata,
    ) -> PipelineResult<Self> {
        if x.is_empty() || y.is_empty() {
            return Err(PipelineError::Model("cannot train on empty dataset".into()));
        }
        if x.len() != y.len() {
            return Err(PipelineError::Model(format!(
                "feature and target count mismatch: {} rows, {} targets",
                x.len(),
                y.len()
            )));
        }
        check_width(x, metadata.feature_names.len())?;

        let n_trees = params.n_trees;
        let max_depth = params.max_depth;
        let seed = params.seed;

        let x_matrix = to_matrix(x)?;
        let y_vec = y.to_vec();
        let forest = RandomForestRegressor::fit(&x_matrix, &y_vec, params)
            .map_err(|e| PipelineError::Model(format!("random forest training failed: {e:?}")))?;

        let importances = metadata
            .feature_names
            .iter()
            .map(|name| FeatureImportance {
                feature: name.clone(),
                importance: 0.0,
            })
            .collect();

        Ok(Self {
            metadata,
            importances,
            n_trees,
            max_depth,
            seed,
            forest,
        })
    }

    /// Importances in training feature order.
    pub fn feature_importances(&self) -> &[FeatureImportance] {
        &self.importances
    }

    pub(crate) fn set_importances(&mut self, scores: Vec<f64>) -> PipelineResult<()> {
        if scores.len() != self.importances.len() {
            return Err(PipelineError::Model(format!(
                "{} importance scores for {} features",
                scores.len(),
                self.importances.len()
            )));
        }
        for (entry, score) in self.importances.iter_mut().zip(scores) {
            entry.importance = score;
        }
        Ok(())
    }

    /// Write the artifact atomically.
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        self.stage(path)?.commit()?;
        info!(path = %path.display(), model_id = %self.metadata.model_id, "saved model");
        Ok(())
    }

    /// Serialize beside `path`; the artifact is replaced on commit.
    pub fn stage(&self, path: &Path) -> PipelineResult<Staged> {
        let bytes = bincode::serialize(self)
            .map_err(|e| PipelineError::Model(format!("failed to serialize model: {e}")))?;
        stage_bytes(&bytes, path)
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::missing(
                path,
                "no trained model; run `demand-forecast train-predict` first",
            ));
        }
        let bytes = fs::read(path)?;
        bincode::deserialize(&bytes)
            .map_err(|e| PipelineError::Model(format!("failed to deserialize {}: {e}", path.display())))
    }
}

impl LoadModel for RandomForestModel {
    fn predict(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_width(rows, self.metadata.feature_names.len())?;

        let x = to_matrix(rows)?;
        let predictions = self
            .forest
            .predict(&x)
            .map_err(|e| PipelineError::Model(format!("prediction failed: {e:?}")))?;

        if predictions.len() != rows.len() {
            return Err(PipelineError::Model(format!(
                "model returned {} predictions for {} rows",
                predictions.len(),
                rows.len()
            )));
        }
        Ok(predictions)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
