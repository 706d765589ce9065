//! End-to-end batch run over synthetic stores: build features, train,
//! evaluate and forecast, all under a temporary data directory.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use tempfile::TempDir;

use energy_demand_forecast::config::Config;
use energy_demand_forecast::domain::{Observation, LOAD_FIELD, WEATHER_FIELDS};
use energy_demand_forecast::error::PipelineError;
use energy_demand_forecast::jobs;
use energy_demand_forecast::store::table::{read_f64s, read_frame, read_times};
use energy_demand_forecast::store::TimeSeriesStore;

const DAYS: i64 = 8;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn temperature(t: NaiveDateTime) -> f64 {
    5.0 + 6.0 * ((t.hour() as f64 - 14.0) / 24.0 * std::f64::consts::TAU).cos()
}

fn weather_at(t: NaiveDateTime) -> Observation {
    Observation::new(t, vec![temperature(t), 70.0, if t.hour() == 3 { 0.4 } else { 0.0 }])
}

fn load_at(t: NaiveDateTime) -> f64 {
    let daily = if (7..22).contains(&t.hour()) { 18_000.0 } else { 14_000.0 };
    let weekend = if t.weekday().number_from_monday() >= 6 { -1_500.0 } else { 0.0 };
    daily + weekend - 150.0 * temperature(t)
}

fn config(dir: &TempDir) -> Config {
    let figment = Figment::new()
        .merge(Toml::string(
            r#"
            [location]
            latitude = 40.7128
            longitude = -74.0060
            timezone = "America/New_York"

            [model]
            n_trees = 20
            max_depth = 8
            "#,
        ))
        .merge(Serialized::default("paths.data_dir", dir.path()));
    Config::from_figment(figment).unwrap()
}

fn seed_history(cfg: &Config) {
    let hours: Vec<NaiveDateTime> = (0..DAYS * 24).map(|h| start() + Duration::hours(h)).collect();

    let mut load = TimeSeriesStore::empty(&[LOAD_FIELD]);
    load.merge(hours.iter().map(|t| Observation::single(*t, load_at(*t))))
        .unwrap();
    load.save(&cfg.paths.load_history()).unwrap();

    let mut weather = TimeSeriesStore::empty(&WEATHER_FIELDS);
    weather.merge(hours.iter().map(|t| weather_at(*t))).unwrap();
    weather.save(&cfg.paths.weather_history()).unwrap();
}

fn seed_forecast(cfg: &Config, day: NaiveDate) {
    let midnight = day.and_hms_opt(0, 0, 0).unwrap();
    let mut forecast = TimeSeriesStore::empty(&WEATHER_FIELDS);
    // 36 hours: the rest of `day` plus half of the next
    forecast
        .merge((0..36).map(|h| weather_at(midnight + Duration::hours(h))))
        .unwrap();
    forecast.save(&cfg.paths.weather_forecast()).unwrap();
}

fn forecast_day() -> NaiveDate {
    (start() + Duration::days(DAYS)).date()
}

#[test]
fn test_full_batch_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    seed_history(&cfg);
    seed_forecast(&cfg, forecast_day());

    let rows = jobs::build_features(&cfg).unwrap();
    assert_eq!(rows, (DAYS * 24 - 24) as usize);

    let report = jobs::train_predict_for(&cfg, forecast_day()).unwrap();
    assert_eq!(report.training_rows, rows);
    assert_eq!(report.forecast_hours, 24);
    assert_eq!(report.evaluation.sample_count, rows);
    assert!(report.evaluation.mae.is_finite());

    let tomorrow_path = cfg.paths.tomorrow_forecast();
    let tomorrow = read_frame(&tomorrow_path).unwrap();
    let times = read_times(&tomorrow, "time", &tomorrow_path).unwrap();
    let predicted = read_f64s(&tomorrow, "predicted_load", &tomorrow_path).unwrap();
    assert_eq!(times.len(), 24);
    assert!(times.iter().all(|t| t.date() == forecast_day()));
    assert!(times.windows(2).all(|w| w[0] < w[1]));
    assert!(predicted.iter().all(|p| p.is_finite()));

    let fi_path = cfg.paths.feature_importance();
    let fi = read_frame(&fi_path).unwrap();
    let importance = read_f64s(&fi, "importance", &fi_path).unwrap();
    assert_eq!(importance.len(), 9);
    assert!(importance.windows(2).all(|w| w[0] >= w[1]));

    let eval_path = cfg.paths.evaluation();
    let eval = read_frame(&eval_path).unwrap();
    assert_eq!(eval.height(), rows);

    assert!(cfg.paths.model().exists());
}

#[test]
fn test_missing_forecast_day_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    seed_history(&cfg);
    // forecast covers a different day
    seed_forecast(&cfg, forecast_day() + Duration::days(3));
    jobs::build_features(&cfg).unwrap();

    let err = jobs::train_predict_for(&cfg, forecast_day()).unwrap_err();
    let cause = err.downcast_ref::<PipelineError>().unwrap();
    assert!(matches!(cause, PipelineError::MissingArtifact { .. }));
    assert!(err.to_string().contains("ingest-weather-forecast"));

    assert!(!cfg.paths.model().exists());
    assert!(!cfg.paths.tomorrow_forecast().exists());
}

#[test]
fn test_stages_require_upstream_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);

    let err = jobs::build_features(&cfg).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingArtifact { .. })
    ));

    let err = jobs::train_predict_for(&cfg, forecast_day()).unwrap_err();
    assert!(err.to_string().contains("build-features"));
}

#[test]
fn test_rebuilding_features_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    seed_history(&cfg);

    let first = jobs::build_features(&cfg).unwrap();
    // re-merging the same history must not change the table
    seed_history(&cfg);
    let second = jobs::build_features(&cfg).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_failed_commit_leaves_no_model() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    seed_history(&cfg);
    seed_forecast(&cfg, forecast_day());
    jobs::build_features(&cfg).unwrap();

    // a non-empty directory where the forecast goes cannot be replaced
    std::fs::create_dir_all(cfg.paths.tomorrow_forecast().join("inner")).unwrap();

    let err = jobs::train_predict_for(&cfg, forecast_day()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Storage { .. })
    ));
    assert!(!cfg.paths.model().exists());
    assert!(!cfg.paths.evaluation().exists());
    assert!(!cfg.paths.feature_importance().exists());
}

#[test]
fn test_predict_reuses_saved_model() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    seed_history(&cfg);
    seed_forecast(&cfg, forecast_day());
    jobs::build_features(&cfg).unwrap();

    let err = jobs::predict_for(&cfg, forecast_day()).unwrap_err();
    assert!(err.to_string().contains("train-predict"));

    jobs::train_predict_for(&cfg, forecast_day()).unwrap();
    let path = cfg.paths.tomorrow_forecast();
    let trained = read_f64s(&read_frame(&path).unwrap(), "predicted_load", &path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let hours = jobs::predict_for(&cfg, forecast_day()).unwrap();
    assert_eq!(hours, 24);
    let reloaded = read_f64s(&read_frame(&path).unwrap(), "predicted_load", &path).unwrap();
    assert_eq!(reloaded, trained);
}
