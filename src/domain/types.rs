use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Name of the key column in every persisted table.
pub const TIME_COLUMN: &str = "time";

/// Target column of the load store and the feature table.
pub const LOAD_FIELD: &str = "load";

/// Value columns of the weather history and weather forecast stores.
pub const WEATHER_FIELDS: [&str; 3] = ["temperature_2m", "relative_humidity_2m", "precipitation"];

/// Model inputs, in the order used at training time.
pub const FEATURE_NAMES: [&str; 9] = [
    "temperature_2m",
    "relative_humidity_2m",
    "precipitation",
    "hour",
    "day_of_week",
    "is_weekend",
    "load_lag_1",
    "load_lag_24",
    "load_roll_24",
];

/// Width of the lag-24 and rolling-mean windows, in hourly rows.
pub const DAILY_WINDOW: usize = 24;

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Truncate a timestamp to the start of its hour.
pub fn floor_to_hour(time: NaiveDateTime) -> NaiveDateTime {
    time.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

pub fn is_hour_aligned(time: NaiveDateTime) -> bool {
    time.minute() == 0 && time.second() == 0 && time.nanosecond() == 0
}

/// One timestamped row of a store. `values` follows the store's field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: NaiveDateTime,
    pub values: Vec<f64>,
}

impl Observation {
    pub fn new(time: NaiveDateTime, values: Vec<f64>) -> Self {
        Self { time, values }
    }

    /// Single-field observation, e.g. a load reading.
    pub fn single(time: NaiveDateTime, value: f64) -> Self {
        Self {
            time,
            values: vec![value],
        }
    }
}

/// Calendar features derived directly from a (naive, local) timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFields {
    /// Hour of day (0-23)
    pub hour: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Saturday or Sunday
    pub is_weekend: bool,
}

impl CalendarFields {
    pub fn from_time(time: NaiveDateTime) -> Self {
        let day_of_week = time.weekday().num_days_from_monday();
        Self {
            hour: time.hour(),
            day_of_week,
            is_weekend: day_of_week >= 5,
        }
    }
}

/// Weather inputs for one hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExogenousRow {
    pub time: NaiveDateTime,
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub precipitation: f64,
}

impl ExogenousRow {
    /// Build from a weather-store observation laid out as [`WEATHER_FIELDS`].
    pub fn from_observation(obs: &Observation) -> PipelineResult<Self> {
        match obs.values.as_slice() {
            [temperature_2m, relative_humidity_2m, precipitation] => Ok(Self {
                time: obs.time,
                temperature_2m: *temperature_2m,
                relative_humidity_2m: *relative_humidity_2m,
                precipitation: *precipitation,
            }),
            other => Err(PipelineError::Schema(format!(
                "weather row at {} has {} values, expected {:?}",
                obs.time,
                other.len(),
                WEATHER_FIELDS
            ))),
        }
    }
}

/// Autoregressive inputs for one hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LagFeatures {
    pub load_lag_1: f64,
    pub load_lag_24: f64,
    pub load_roll_24: f64,
}

/// Everything a model row is assembled from, addressable by feature name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureInputs {
    pub calendar: CalendarFields,
    pub weather: ExogenousRow,
    pub lags: LagFeatures,
}

impl FeatureInputs {
    pub fn value(&self, name: &str) -> Option<f64> {
        let v = match name {
            "temperature_2m" => self.weather.temperature_2m,
            "relative_humidity_2m" => self.weather.relative_humidity_2m,
            "precipitation" => self.weather.precipitation,
            "hour" => self.calendar.hour as f64,
            "day_of_week" => self.calendar.day_of_week as f64,
            "is_weekend" => {
                if self.calendar.is_weekend {
                    1.0
                } else {
                    0.0
                }
            }
            "load_lag_1" => self.lags.load_lag_1,
            "load_lag_24" => self.lags.load_lag_24,
            "load_roll_24" => self.lags.load_roll_24,
            _ => return None,
        };
        Some(v)
    }

    /// Lay the inputs out in `names` order.
    pub fn vector(&self, names: &[String]) -> PipelineResult<Vec<f64>> {
        names
            .iter()
            .map(|name| {
                self.value(name).ok_or_else(|| {
                    PipelineError::Model(format!(
                        "model expects feature `{name}` which is not one of {FEATURE_NAMES:?}"
                    ))
                })
            })
            .collect()
    }
}

/// One supervised training row: joined observation plus derived features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub time: NaiveDateTime,
    pub load: f64,
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub precipitation: f64,
    pub hour: u32,
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub load_lag_1: f64,
    pub load_lag_24: f64,
    pub load_roll_24: f64,
}

impl FeatureRow {
    pub fn inputs(&self) -> FeatureInputs {
        FeatureInputs {
            calendar: CalendarFields {
                hour: self.hour,
                day_of_week: self.day_of_week,
                is_weekend: self.is_weekend,
            },
            weather: ExogenousRow {
                time: self.time,
                temperature_2m: self.temperature_2m,
                relative_humidity_2m: self.relative_humidity_2m,
                precipitation: self.precipitation,
            },
            lags: LagFeatures {
                load_lag_1: self.load_lag_1,
                load_lag_24: self.load_lag_24,
                load_roll_24: self.load_roll_24,
            },
        }
    }
}
