//! Feature engineering for the load model
//!
//! Joins load and weather histories on their shared naive local clock and
//! derives calendar, lag and rolling-window features over the joined series.

use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;
use tracing::{info, warn};

use crate::domain::{
    CalendarFields, FeatureRow, DAILY_WINDOW, FEATURE_NAMES, LOAD_FIELD, TIME_COLUMN,
    WEATHER_FIELDS,
};
use crate::error::{PipelineError, PipelineResult};
use crate::store::table::{
    frame, read_f64s, read_frame, read_times, require_columns, time_series, write_frame_atomic,
};
use crate::store::TimeSeriesStore;

/// One timestamp present in both stores.
#[derive(Debug, Clone, Copy, PartialEq)]
struct JoinedRow {
    time: NaiveDateTime,
    load: f64,
    weather: [f64; 3],
}

/// Builds the supervised training table.
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Inner-join `load` and `weather` on timestamp, then derive features.
    ///
    /// Lags are positional over the joined series, so a hole in either store
    /// is also a hole in lag continuity. The first [`DAILY_WINDOW`] joined rows
    /// only seed the windows and are dropped.
    pub fn build(
        load: &TimeSeriesStore,
        weather: &TimeSeriesStore,
    ) -> PipelineResult<Vec<FeatureRow>> {
        let joined = Self::join(load, weather)?;

        if joined.len() <= DAILY_WINDOW {
            warn!(
                joined = joined.len(),
                needed = DAILY_WINDOW + 1,
                "not enough joined history for a single feature row"
            );
        }

        let loads: Vec<f64> = joined.iter().map(|r| r.load).collect();
        let rows: Vec<FeatureRow> = joined
            .iter()
            .enumerate()
            .skip(DAILY_WINDOW)
            .map(|(i, r)| {
                let calendar = CalendarFields::from_time(r.time);
                let window = &loads[i + 1 - DAILY_WINDOW..=i];
                FeatureRow {
                    time: r.time,
                    load: r.load,
                    temperature_2m: r.weather[0],
                    relative_humidity_2m: r.weather[1],
                    precipitation: r.weather[2],
                    hour: calendar.hour,
                    day_of_week: calendar.day_of_week,
                    is_weekend: calendar.is_weekend,
                    load_lag_1: loads[i - 1],
                    load_lag_24: loads[i - DAILY_WINDOW],
                    load_roll_24: window.iter().sum::<f64>() / DAILY_WINDOW as f64,
                }
            })
            .collect();

        info!(
            load_rows = load.len(),
            weather_rows = weather.len(),
            joined = joined.len(),
            features = rows.len(),
            first = ?rows.first().map(|r| r.time),
            last = ?rows.last().map(|r| r.time),
            "built feature table"
        );
        Ok(rows)
    }

    fn join(load: &TimeSeriesStore, weather: &TimeSeriesStore) -> PipelineResult<Vec<JoinedRow>> {
        if load.is_empty() {
            return Err(PipelineError::Join("load history is empty".into()));
        }
        if weather.is_empty() {
            return Err(PipelineError::Join("weather history is empty".into()));
        }
        if fields_differ(load.fields(), &[LOAD_FIELD]) {
            return Err(PipelineError::Schema(format!(
                "load store fields are {:?}, expected [\"{LOAD_FIELD}\"]",
                load.fields()
            )));
        }
        if fields_differ(weather.fields(), &WEATHER_FIELDS) {
            return Err(PipelineError::Schema(format!(
                "weather store fields are {:?}, expected {:?}",
                weather.fields(),
                WEATHER_FIELDS
            )));
        }

        let joined: Vec<JoinedRow> = load
            .iter()
            .filter_map(|(time, l)| {
                weather.get(&time).map(|w| JoinedRow {
                    time,
                    load: l[0],
                    weather: [w[0], w[1], w[2]],
                })
            })
            .collect();

        if joined.is_empty() {
            return Err(PipelineError::Join(format!(
                "no overlapping timestamps: load covers {:?}..{:?}, weather covers {:?}..{:?}",
                load.first_time(),
                load.last_time(),
                weather.first_time(),
                weather.last_time()
            )));
        }
        Ok(joined)
    }
}

fn fields_differ(actual: &[String], expected: &[&str]) -> bool {
    actual.len() != expected.len() || actual.iter().zip(expected).any(|(a, e)| a != e)
}

/// Persist the feature table (`time`, `load`, then every feature column).
pub fn save_feature_table(rows: &[FeatureRow], path: &Path) -> PipelineResult<()> {
    let times: Vec<NaiveDateTime> = rows.iter().map(|r| r.time).collect();
    let f = |get: fn(&FeatureRow) -> f64| rows.iter().map(get).collect::<Vec<f64>>();
    let i = |get: fn(&FeatureRow) -> i32| rows.iter().map(get).collect::<Vec<i32>>();

    let columns = vec![
        time_series(TIME_COLUMN, &times).map_err(|e| PipelineError::storage(path, e))?,
        Series::new(LOAD_FIELD, f(|r| r.load)),
        Series::new("temperature_2m", f(|r| r.temperature_2m)),
        Series::new("relative_humidity_2m", f(|r| r.relative_humidity_2m)),
        Series::new("precipitation", f(|r| r.precipitation)),
        Series::new("hour", i(|r| r.hour as i32)),
        Series::new("day_of_week", i(|r| r.day_of_week as i32)),
        Series::new("is_weekend", i(|r| r.is_weekend as i32)),
        Series::new("load_lag_1", f(|r| r.load_lag_1)),
        Series::new("load_lag_24", f(|r| r.load_lag_24)),
        Series::new("load_roll_24", f(|r| r.load_roll_24)),
    ];
    let mut df = frame(path, columns)?;
    write_frame_atomic(&mut df, path)?;
    info!(path = %path.display(), rows = rows.len(), "saved feature table");
    Ok(())
}

/// Load the persisted feature table, sorted by time.
pub fn load_feature_table(path: &Path) -> PipelineResult<Vec<FeatureRow>> {
    if !path.exists() {
        return Err(PipelineError::missing(
            path,
            "no feature table; run `demand-forecast build-features` first",
        ));
    }
    let df = read_frame(path)?;
    let mut required = vec![TIME_COLUMN, LOAD_FIELD];
    required.extend_from_slice(&FEATURE_NAMES);
    require_columns(&df, &required, path)?;

    let times = read_times(&df, TIME_COLUMN, path)?;
    let col = |name: &str| read_f64s(&df, name, path);
    let load = col(LOAD_FIELD)?;
    let temperature = col("temperature_2m")?;
    let humidity = col("relative_humidity_2m")?;
    let precipitation = col("precipitation")?;
    let hour = col("hour")?;
    let day_of_week = col("day_of_week")?;
    let is_weekend = col("is_weekend")?;
    let lag_1 = col("load_lag_1")?;
    let lag_24 = col("load_lag_24")?;
    let roll_24 = col("load_roll_24")?;

    let mut rows: Vec<FeatureRow> = times
        .into_iter()
        .enumerate()
        .map(|(i, time)| FeatureRow {
            time,
            load: load[i],
            temperature_2m: temperature[i],
            relative_humidity_2m: humidity[i],
            precipitation: precipitation[i],
            hour: hour[i] as u32,
            day_of_week: day_of_week[i] as u32,
            is_weekend: is_weekend[i] != 0.0,
            load_lag_1: lag_1[i],
            load_lag_24: lag_24[i],
            load_roll_24: roll_24[i],
        })
        .collect();
    rows.sort_by_key(|r| r.time);
    rows.dedup_by_key(|r| r.time);

    if rows.is_empty() {
        return Err(PipelineError::missing(
            path,
            "feature table has no rows; ingest more history and re-run `demand-forecast build-features`",
        ));
    }
    Ok(rows)
}
