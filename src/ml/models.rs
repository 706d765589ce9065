//! ML Model Definitions

use super::{ModelMetadata, ModelType};
use crate::error::{PipelineError, PipelineResult};

/// A fitted tabular regressor.
///
/// Rows passed to [`LoadModel::predict`] must be laid out in
/// [`LoadModel::feature_names`] order, the order used at fit time.
pub trait LoadModel: Send + Sync {
    /// One prediction per input row, in input order.
    fn predict(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<f64>>;

    fn metadata(&self) -> &ModelMetadata;

    fn feature_names(&self) -> &[String] {
        &self.metadata().feature_names
    }

    fn model_type(&self) -> ModelType {
        self.metadata().model_type
    }
}

/// Reject rows whose width differs from the model's feature list.
pub(crate) fn check_width(rows: &[Vec<f64>], expected: usize) -> PipelineResult<()> {
    match rows.iter().position(|r| r.len() != expected) {
        Some(i) => Err(PipelineError::Model(format!(
            "feature count mismatch at row {i}: expected {expected}, got {}",
            rows[i].len()
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_mismatch_names_row() {
        let err = check_width(&[vec![1.0, 2.0], vec![1.0]], 2).unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));
        assert!(err.to_string().contains("row 1"));
        assert!(check_width(&[vec![1.0, 2.0]], 2).is_ok());
        assert!(check_width(&[], 5).is_ok());
    }
}
