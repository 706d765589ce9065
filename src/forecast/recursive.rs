//! Recursive (autoregressive) multi-step load forecast
//!
//! Each step's lag and rolling features come from a working series that
//! starts as observed history and grows by one prediction per step. Errors
//! compound forward; nothing observed later corrects them within a run.

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::{debug, info};

use crate::domain::{
    CalendarFields, ExogenousRow, FeatureInputs, ForecastRow, LagFeatures, DAILY_WINDOW,
};
use crate::error::{PipelineError, PipelineResult};
use crate::ml::LoadModel;
use crate::store::TimeSeriesStore;

/// Lag basis for the next step, from a series whose last element is the most
/// recent known or predicted value.
///
/// With fewer than [`DAILY_WINDOW`] points, `load_lag_24` falls back to the
/// latest value and the rolling mean covers what is there.
pub fn lag_features(series: &[f64]) -> PipelineResult<LagFeatures> {
    let Some(&last) = series.last() else {
        return Err(PipelineError::InsufficientHistory(
            "no recent load values to derive lag features from".into(),
        ));
    };
    let n = series.len();
    let load_lag_24 = if n >= DAILY_WINDOW {
        series[n - DAILY_WINDOW]
    } else {
        last
    };
    let window = &series[n - n.min(DAILY_WINDOW)..];
    Ok(LagFeatures {
        load_lag_1: last,
        load_lag_24,
        load_roll_24: window.iter().sum::<f64>() / window.len() as f64,
    })
}

pub struct RecursiveForecaster<'a> {
    model: &'a dyn LoadModel,
}

impl<'a> RecursiveForecaster<'a> {
    pub fn new(model: &'a dyn LoadModel) -> Self {
        Self { model }
    }

    /// One [`ForecastRow`] per `future` entry, same order.
    ///
    /// `recent_tail` is observed load, most recent last; it should hold at
    /// least [`DAILY_WINDOW`] values. `future` must be strictly ascending.
    pub fn forecast(
        &self,
        recent_tail: &[f64],
        future: &[ExogenousRow],
    ) -> PipelineResult<Vec<ForecastRow>> {
        if future.is_empty() {
            return Ok(Vec::new());
        }
        if recent_tail.is_empty() {
            return Err(PipelineError::InsufficientHistory(format!(
                "forecast of {} hours requested with an empty load history; run `demand-forecast ingest-load` first",
                future.len()
            )));
        }
        if let Some((a, b)) = future.iter().tuple_windows().find(|(a, b)| a.time >= b.time) {
            return Err(PipelineError::Schema(format!(
                "future weather must be strictly ascending, found {} then {}",
                a.time, b.time
            )));
        }

        let names = self.model.feature_names();
        let seed = (recent_tail.to_vec(), Vec::with_capacity(future.len()));

        let (_, rows) = future.iter().try_fold(seed, |(mut series, mut out), exo| {
            let inputs = FeatureInputs {
                calendar: CalendarFields::from_time(exo.time),
                weather: *exo,
                lags: lag_features(&series)?,
            };
            let predicted_load = self.predict_one(inputs.vector(names)?)?;
            debug!(time = %exo.time, lags = ?inputs.lags, predicted_load, "forecast step");

            series.push(predicted_load);
            out.push(ForecastRow {
                time: exo.time,
                predicted_load,
            });
            Ok::<_, PipelineError>((series, out))
        })?;

        info!(
            hours = rows.len(),
            first = %rows[0].time,
            last = %rows[rows.len() - 1].time,
            "generated recursive forecast"
        );
        Ok(rows)
    }

    fn predict_one(&self, row: Vec<f64>) -> PipelineResult<f64> {
        let value = self
            .model
            .predict(&[row])?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Model("model returned no prediction".into()))?;
        if !value.is_finite() {
            return Err(PipelineError::Model(format!(
                "model produced a non-finite prediction ({value})"
            )));
        }
        Ok(value)
    }
}

/// Forecast inputs for one calendar day from the weather-forecast store.
pub fn exogenous_for_day(store: &TimeSeriesStore, day: NaiveDate) -> PipelineResult<Vec<ExogenousRow>> {
    store
        .slice(day, day)
        .iter()
        .map(ExogenousRow::from_observation)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{feature_names, Observation, WEATHER_FIELDS};
    use crate::ml::testing::LinearModel;
    use crate::ml::{ModelMetadata, ModelType};
    use chrono::{Duration, NaiveDateTime};
    use rstest::rstest;
    use std::sync::Mutex;

    fn hour(h: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(h)
    }

    fn exo(h: i64) -> ExogenousRow {
        ExogenousRow {
            time: hour(h),
            temperature_2m: 5.0,
            relative_humidity_2m: 80.0,
            precipitation: 0.0,
        }
    }

    /// Records every row it is asked to predict and answers a fixed sequence.
    struct RecordingModel {
        metadata: ModelMetadata,
        answers: Vec<f64>,
        seen: Mutex<Vec<Vec<f64>>>,
    }

    impl RecordingModel {
        fn new(answers: Vec<f64>) -> Self {
            Self {
                metadata: ModelMetadata::new(ModelType::RandomForest, 0, feature_names()),
                answers,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self, step: usize, feature: &str) -> f64 {
            let idx = self.metadata.feature_names.iter().position(|n| n == feature).unwrap();
            self.seen.lock().unwrap()[step][idx]
        }
    }

    impl LoadModel for RecordingModel {
        fn predict(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
            let mut seen = self.seen.lock().unwrap();
            let mut out = Vec::new();
            for row in rows {
                out.push(self.answers[seen.len() % self.answers.len()]);
                seen.push(row.clone());
            }
            Ok(out)
        }

        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }
    }

    #[test]
    fn test_lag_basis_from_full_day() {
        // hour i -> (i+1)*10
        let series: Vec<f64> = (1..=24).map(|i| i as f64 * 10.0).collect();
        let lags = lag_features(&series).unwrap();
        assert_eq!(lags.load_lag_1, 240.0);
        assert_eq!(lags.load_lag_24, 10.0);
        assert_eq!(lags.load_roll_24, 125.0);
    }

    #[rstest]
    #[case(vec![5.0], 5.0, 5.0, 5.0)]
    #[case(vec![1.0, 2.0, 3.0], 3.0, 3.0, 2.0)]
    fn test_short_history_degrades(
        #[case] series: Vec<f64>,
        #[case] lag_1: f64,
        #[case] lag_24: f64,
        #[case] roll: f64,
    ) {
        let lags = lag_features(&series).unwrap();
        assert_eq!(lags.load_lag_1, lag_1);
        assert_eq!(lags.load_lag_24, lag_24);
        assert_eq!(lags.load_roll_24, roll);
    }

    #[test]
    fn test_long_history_uses_last_day_only() {
        let mut series = vec![1_000.0; 10];
        series.extend((1..=24).map(|i| i as f64 * 10.0));
        let lags = lag_features(&series).unwrap();
        assert_eq!(lags.load_lag_24, 10.0);
        assert_eq!(lags.load_roll_24, 125.0);
    }

    #[test]
    fn test_first_step_uses_observed_tail() {
        let tail: Vec<f64> = (1..=24).map(|i| i as f64 * 10.0).collect();
        let model = RecordingModel::new(vec![999.0]);
        let rows = RecursiveForecaster::new(&model).forecast(&tail, &[exo(24)]).unwrap();

        assert_eq!(rows, vec![ForecastRow { time: hour(24), predicted_load: 999.0 }]);
        assert_eq!(model.seen(0, "load_lag_1"), 240.0);
        assert_eq!(model.seen(0, "load_lag_24"), 10.0);
        assert_eq!(model.seen(0, "load_roll_24"), 125.0);
        assert_eq!(model.seen(0, "hour"), 0.0);
        assert_eq!(model.seen(0, "temperature_2m"), 5.0);
    }

    #[test]
    fn test_prediction_feeds_next_step() {
        let tail = vec![100.0; 24];
        let model = RecordingModel::new(vec![130.0, 90.0]);
        let rows = RecursiveForecaster::new(&model)
            .forecast(&tail, &[exo(0), exo(1)])
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(model.seen(0, "load_lag_1"), 100.0);
        assert_eq!(model.seen(1, "load_lag_1"), rows[0].predicted_load);
        assert_eq!(model.seen(1, "load_lag_1"), 130.0);
        // window slid by one: 23 observed values plus the first prediction
        assert_eq!(model.seen(1, "load_roll_24"), (23.0 * 100.0 + 130.0) / 24.0);
        assert_eq!(model.seen(1, "load_lag_24"), 100.0);
    }

    #[test]
    fn test_one_row_per_input_in_order() {
        let tail = vec![50.0; 30];
        let model = LinearModel::new(
            feature_names(),
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 0.0, 0.5],
            0.0,
        )
        .unwrap();
        let future: Vec<ExogenousRow> = (0..24).map(exo).collect();
        let rows = RecursiveForecaster::new(&model).forecast(&tail, &future).unwrap();

        assert_eq!(rows.len(), 24);
        assert!(rows.iter().zip(&future).all(|(r, f)| r.time == f.time));
    }

    #[test]
    fn test_empty_future_is_empty() {
        let model = RecordingModel::new(vec![1.0]);
        let forecaster = RecursiveForecaster::new(&model);
        assert!(forecaster.forecast(&[1.0; 24], &[]).unwrap().is_empty());
        assert!(forecaster.forecast(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_empty_tail_is_insufficient_history() {
        let model = RecordingModel::new(vec![1.0]);
        let err = RecursiveForecaster::new(&model)
            .forecast(&[], &[exo(0)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientHistory(_)));
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsorted_future_rejected() {
        let model = RecordingModel::new(vec![1.0]);
        let err = RecursiveForecaster::new(&model)
            .forecast(&[1.0; 24], &[exo(2), exo(1)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_non_finite_prediction_aborts() {
        let model = RecordingModel::new(vec![f64::NAN]);
        assert!(matches!(
            RecursiveForecaster::new(&model).forecast(&[1.0; 24], &[exo(0)]),
            Err(PipelineError::Model(_))
        ));
    }

    #[test]
    fn test_exogenous_for_day() {
        let mut store = TimeSeriesStore::empty(&WEATHER_FIELDS);
        store
            .merge((0..48).map(|h| Observation::new(hour(h), vec![h as f64, 50.0, 0.0])))
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let rows = exogenous_for_day(&store, day).unwrap();
        assert_eq!(rows.len(), 24);
        assert_eq!(rows[0].time, hour(24));
        assert_eq!(rows[0].temperature_2m, 24.0);

        let empty = exogenous_for_day(&store, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()).unwrap();
        assert!(empty.is_empty());
    }
}
