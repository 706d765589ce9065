use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One hour of the forward-looking forecast. Transient output, never merged
/// back into a store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub time: NaiveDateTime,
    pub predicted_load: f64,
}

/// Actual versus replayed prediction for one historical feature row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub time: NaiveDateTime,
    pub load: f64,
    pub predicted_load: f64,
}

impl EvaluationRow {
    pub fn abs_error(&self) -> f64 {
        (self.load - self.predicted_load).abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}
