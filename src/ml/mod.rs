//! Machine Learning Module
//!
//! The regressor is an external collaborator: anything that can `predict` a
//! batch of feature rows laid out in a known feature order. This module holds
//! that seam ([`LoadModel`]), the smartcore random forest that implements it,
//! and the training pipeline that fits it and derives feature importances.
//!
//! # Architecture
//! - [`training`]: fit on a feature table, permutation importance
//! - [`smartcore`]: random forest wrapper and model artifact IO
//! - [`models`]: the prediction trait

use serde::{Deserialize, Serialize};

use crate::forecast::metrics::ForecastMetrics;

pub mod models;
pub mod smartcore;
pub mod training;

#[cfg(test)]
pub(crate) mod testing;

pub use models::*;
pub use self::smartcore::RandomForestModel;
pub use training::{ModelTrainer, TrainingConfig};

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelType {
    RandomForest,
}

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub version: String,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub training_samples: usize,
    /// In-sample fit quality; not a claim of forecast accuracy.
    pub training_metrics: Option<ForecastMetrics>,
    pub feature_names: Vec<String>,
}

impl ModelMetadata {
    pub fn new(model_type: ModelType, training_samples: usize, feature_names: Vec<String>) -> Self {
        let prefix = match model_type {
            ModelType::RandomForest => "smartcore_rf",
        };
        Self {
            model_id: format!("{}_{}", prefix, uuid::Uuid::new_v4()),
            model_type,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            training_samples,
            training_metrics: None,
            feature_names,
        }
    }
}
