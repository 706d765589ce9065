//! Backward-looking replay of the model over observed history
//!
//! Every row uses its own observed lag features. This is deliberately a
//! separate path from [`super::recursive`], which feeds predictions back.

use itertools::Itertools;
use tracing::info;

use super::metrics::ForecastMetrics;
use crate::domain::{EvaluationRow, FeatureRow};
use crate::error::{PipelineError, PipelineResult};
use crate::ml::LoadModel;

pub struct EvaluationProjector;

impl EvaluationProjector {
    /// One `(time, load, predicted_load)` row per feature row, same order.
    pub fn project(rows: &[FeatureRow], model: &dyn LoadModel) -> PipelineResult<Vec<EvaluationRow>> {
        if let Some((a, b)) = rows.iter().tuple_windows().find(|(a, b)| a.time >= b.time) {
            return Err(PipelineError::Schema(format!(
                "feature table must be strictly ascending, found {} then {}",
                a.time, b.time
            )));
        }

        let names = model.feature_names();
        let x = rows
            .iter()
            .map(|r| r.inputs().vector(names))
            .collect::<PipelineResult<Vec<_>>>()?;
        let predicted = model.predict(&x)?;

        if predicted.len() != rows.len() {
            return Err(PipelineError::Model(format!(
                "model returned {} predictions for {} feature rows",
                predicted.len(),
                rows.len()
            )));
        }
        if let Some(i) = predicted.iter().position(|p| !p.is_finite()) {
            return Err(PipelineError::Model(format!(
                "non-finite prediction for {}",
                rows[i].time
            )));
        }

        let projected: Vec<EvaluationRow> = rows
            .iter()
            .zip(predicted)
            .map(|(r, predicted_load)| EvaluationRow {
                time: r.time,
                load: r.load,
                predicted_load,
            })
            .collect();

        if let Ok(metrics) = ForecastMetrics::from_evaluation(&projected) {
            info!(%metrics, "evaluation replay");
        }
        Ok(projected)
    }
}
