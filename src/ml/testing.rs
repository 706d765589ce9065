//! Deterministic stand-ins for a fitted regressor.

use super::models::check_width;
use super::{LoadModel, ModelMetadata, ModelType};
use crate::error::{PipelineError, PipelineResult};

/// `intercept + Σ coefficient·feature`, so expected predictions can be
/// written down by hand.
#[derive(Debug, Clone)]
pub struct LinearModel {
    metadata: ModelMetadata,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn new(feature_names: Vec<String>, coefficients: Vec<f64>, intercept: f64) -> PipelineResult<Self> {
        if feature_names.len() != coefficients.len() {
            return Err(PipelineError::Model(format!(
                "{} coefficients for {} features",
                coefficients.len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            metadata: ModelMetadata::new(ModelType::RandomForest, 0, feature_names),
            coefficients,
            intercept,
        })
    }
}

impl LoadModel for LinearModel {
    fn predict(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
        check_width(rows, self.coefficients.len())?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.coefficients)
                    .map(|(f, c)| f * c)
                    .sum::<f64>()
                    + self.intercept
            })
            .collect())
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_linear_predict() {
        let model = LinearModel::new(names(&["f1", "f2", "f3"]), vec![2.0, 3.0, 1.0], 5.0).unwrap();

        let preds = model
            .predict(&[vec![1.0, 2.0, 3.0], vec![0.0, 0.0, 0.0]])
            .unwrap();
        // 2*1 + 3*2 + 1*3 + 5 = 16
        assert_eq!(preds, vec![16.0, 5.0]);
        assert_eq!(model.feature_names(), &names(&["f1", "f2", "f3"])[..]);
    }

    #[test]
    fn test_coefficient_count_checked() {
        assert!(LinearModel::new(names(&["a"]), vec![1.0, 2.0], 0.0).is_err());
    }
}
