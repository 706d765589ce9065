//! Accuracy metrics for the evaluation table
//!
//! Backward-looking only: these describe how well the model replays
//! history, they say nothing about the recursive forecast.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::EvaluationRow;

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (%), over rows with non-zero actuals
    pub mape: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    pub sample_count: usize,
    pub max_abs_error: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastMetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}

impl ForecastMetrics {
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(ForecastMetricsError::EmptyData);
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let rmse = (sse / n).sqrt();
        let max_abs_error = errors.iter().fold(0.0f64, |m, e| m.max(e.abs()));

        let pct: Vec<f64> = actual
            .iter()
            .zip(&errors)
            .filter(|(a, _)| a.abs() > 1e-6)
            .map(|(a, e)| (e / a).abs() * 100.0)
            .collect();
        let mape = if pct.is_empty() {
            0.0
        } else {
            pct.iter().sum::<f64>() / pct.len() as f64
        };

        let mean_actual = actual.iter().sum::<f64>() / n;
        let sst: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if sst > 1e-10 { 1.0 - sse / sst } else { 0.0 };

        Ok(Self {
            mae,
            rmse,
            mape,
            r2,
            sample_count: actual.len(),
            max_abs_error,
        })
    }

    pub fn from_evaluation(rows: &[EvaluationRow]) -> Result<Self, ForecastMetricsError> {
        let actual: Vec<f64> = rows.iter().map(|r| r.load).collect();
        let predicted: Vec<f64> = rows.iter().map(|r| r.predicted_load).collect();
        Self::calculate(&actual, &predicted)
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.1}, RMSE={:.1}, MAPE={:.2}%, R²={:.3}, n={}",
            self.mae, self.rmse, self.mape, self.r2, self.sample_count
        )
    }
}
