//! Tables consumed by the dashboard. Column names are a contract.

use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;
use tracing::debug;

use super::table::{frame, stage_frame, time_series, Staged};
use crate::domain::{EvaluationRow, FeatureImportance, ForecastRow, TIME_COLUMN};
use crate::error::{PipelineError, PipelineResult};

pub const PREDICTED_LOAD: &str = "predicted_load";

/// `feature, importance`, most important first.
pub fn save_importances(importances: &[FeatureImportance], path: &Path) -> PipelineResult<()> {
    stage_importances(importances, path)?.commit()
}

pub fn stage_importances(importances: &[FeatureImportance], path: &Path) -> PipelineResult<Staged> {
    let mut sorted = importances.to_vec();
    sorted.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let mut df = frame(
        path,
        vec![
            Series::new("feature", sorted.iter().map(|i| i.feature.as_str()).collect::<Vec<_>>()),
            Series::new("importance", sorted.iter().map(|i| i.importance).collect::<Vec<_>>()),
        ],
    )?;
    let staged = stage_frame(&mut df, path)?;
    debug!(path = %path.display(), top = ?sorted.first().map(|i| &i.feature), "staged feature importance");
    Ok(staged)
}

/// `time, load, predicted_load`.
pub fn save_evaluation(rows: &[EvaluationRow], path: &Path) -> PipelineResult<()> {
    stage_evaluation(rows, path)?.commit()
}

pub fn stage_evaluation(rows: &[EvaluationRow], path: &Path) -> PipelineResult<Staged> {
    let times: Vec<NaiveDateTime> = rows.iter().map(|r| r.time).collect();
    let mut df = frame(
        path,
        vec![
            time_series(TIME_COLUMN, &times).map_err(|e| PipelineError::storage(path, e))?,
            Series::new("load", rows.iter().map(|r| r.load).collect::<Vec<_>>()),
            Series::new(PREDICTED_LOAD, rows.iter().map(|r| r.predicted_load).collect::<Vec<_>>()),
        ],
    )?;
    let staged = stage_frame(&mut df, path)?;
    debug!(path = %path.display(), rows = rows.len(), "staged evaluation predictions");
    Ok(staged)
}

/// `time, predicted_load`.
pub fn save_forecast(rows: &[ForecastRow], path: &Path) -> PipelineResult<()> {
    stage_forecast(rows, path)?.commit()
}

pub fn stage_forecast(rows: &[ForecastRow], path: &Path) -> PipelineResult<Staged> {
    let times: Vec<NaiveDateTime> = rows.iter().map(|r| r.time).collect();
    let mut df = frame(
        path,
        vec![
            time_series(TIME_COLUMN, &times).map_err(|e| PipelineError::storage(path, e))?,
            Series::new(PREDICTED_LOAD, rows.iter().map(|r| r.predicted_load).collect::<Vec<_>>()),
        ],
    )?;
    let staged = stage_frame(&mut df, path)?;
    debug!(
        path = %path.display(),
        first = ?times.first(),
        last = ?times.last(),
        "staged forecast"
    );
    Ok(staged)
}
