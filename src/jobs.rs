//! Batch stages, each reading and writing artifacts under the data directory.
//!
//! A stage either writes all of its outputs or fails before replacing any of
//! them; every write goes through an atomic rename.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use tracing::info;

use crate::config::Config;
use crate::domain::{ExogenousRow, LOAD_FIELD, WEATHER_FIELDS};
use crate::error::PipelineError;
use crate::forecast::{
    exogenous_for_day, load_feature_table, save_feature_table, EvaluationProjector,
    FeatureBuilder, ForecastMetrics, RecursiveForecaster,
};
use crate::ingest::{
    IngestionSync, NyisoLoadProvider, OpenMeteoEndpoint, OpenMeteoProvider, SeriesSchema,
    SyncWindow,
};
use crate::ml::{LoadModel, ModelTrainer, RandomForestModel};
use crate::store::table::commit_all;
use crate::store::{outputs, MergeSummary, TimeSeriesStore};

const INGEST_LOAD_HINT: &str = "run `demand-forecast ingest-load` first";
const INGEST_WEATHER_HINT: &str = "run `demand-forecast ingest-weather` first";
const INGEST_FORECAST_HINT: &str = "re-run `demand-forecast ingest-weather-forecast` and try again";

fn weather_provider(cfg: &Config, base_url: &str, endpoint: OpenMeteoEndpoint) -> Result<OpenMeteoProvider> {
    Ok(OpenMeteoProvider::new(
        base_url,
        cfg.location.latitude,
        cfg.location.longitude,
        cfg.timezone()?,
        endpoint,
        cfg.providers.http_timeout(),
    )?)
}

/// Pull the lookback window of system load and merge it into the load history.
pub async fn ingest_load(cfg: &Config) -> Result<MergeSummary> {
    let path = cfg.paths.load_history();
    let provider = NyisoLoadProvider::new(&cfg.providers.nyiso_base_url, cfg.providers.http_timeout())?;
    let sync = IngestionSync::new(SeriesSchema::load(), cfg.timezone()?);

    let mut store = TimeSeriesStore::load(&path, &[LOAD_FIELD])?;
    let window = SyncWindow::lookback(Utc::now(), cfg.history.lookback_days);
    let summary = sync.sync(&provider, &mut store, &window).await?;
    store.save(&path)?;
    Ok(summary)
}

/// Pull archived weather for the lookback window into the weather history.
pub async fn ingest_weather(cfg: &Config) -> Result<MergeSummary> {
    let path = cfg.paths.weather_history();
    let provider = weather_provider(cfg, &cfg.providers.weather_archive_url, OpenMeteoEndpoint::Archive)?;
    let sync = IngestionSync::new(SeriesSchema::weather(), cfg.timezone()?);

    let mut store = TimeSeriesStore::load(&path, &WEATHER_FIELDS)?;
    let window = SyncWindow::lookback(Utc::now(), cfg.history.lookback_days);
    let summary = sync.sync(&provider, &mut store, &window).await?;
    store.save(&path)?;
    Ok(summary)
}

/// Replace the weather forecast with the hours after now.
pub async fn ingest_weather_forecast(cfg: &Config) -> Result<MergeSummary> {
    let path = cfg.paths.weather_forecast();
    let provider = weather_provider(
        cfg,
        &cfg.providers.weather_forecast_url,
        OpenMeteoEndpoint::Forecast { days: cfg.providers.forecast_days },
    )?;
    let sync = IngestionSync::new(SeriesSchema::weather(), cfg.timezone()?);

    // a new forecast supersedes the previous one
    let mut store = TimeSeriesStore::empty(&WEATHER_FIELDS);
    let now = Utc::now();
    let summary = sync.sync(&provider, &mut store, &SyncWindow::new(now, now)).await?;
    store.save(&path)?;
    Ok(summary)
}

/// Join load and weather history into the training table.
pub fn build_features(cfg: &Config) -> Result<usize> {
    let load = TimeSeriesStore::require(&cfg.paths.load_history(), &[LOAD_FIELD], INGEST_LOAD_HINT)?;
    let weather = TimeSeriesStore::require(&cfg.paths.weather_history(), &WEATHER_FIELDS, INGEST_WEATHER_HINT)?;

    let rows = FeatureBuilder::build(&load, &weather)?;
    save_feature_table(&rows, &cfg.paths.features())?;
    Ok(rows.len())
}

/// What [`train_predict`] produced.
#[derive(Debug, Clone)]
pub struct TrainPredictReport {
    pub training_rows: usize,
    pub evaluation: ForecastMetrics,
    pub forecast_day: NaiveDate,
    pub forecast_hours: usize,
}

/// Train on the feature table, then forecast tomorrow in the configured zone.
pub fn train_predict(cfg: &Config) -> Result<TrainPredictReport> {
    train_predict_for(cfg, tomorrow(cfg)?)
}

fn tomorrow(cfg: &Config) -> Result<NaiveDate> {
    Utc::now()
        .with_timezone(&cfg.timezone()?)
        .date_naive()
        .checked_add_days(Days::new(1))
        .context("date overflow computing tomorrow")
}

/// Observed load tail and tomorrow's weather for a forecast of `day`.
fn forecast_inputs(cfg: &Config, day: NaiveDate) -> Result<(Vec<f64>, Vec<ExogenousRow>)> {
    let paths = &cfg.paths;
    let tail = TimeSeriesStore::require(&paths.load_history(), &[LOAD_FIELD], INGEST_LOAD_HINT)?
        .column(LOAD_FIELD)
        .unwrap_or_default();
    let forecast_store = TimeSeriesStore::require(&paths.weather_forecast(), &WEATHER_FIELDS, INGEST_FORECAST_HINT)?;
    let future = exogenous_for_day(&forecast_store, day)?;
    if future.is_empty() {
        return Err(PipelineError::missing(
            paths.weather_forecast(),
            format!("no forecast rows for {day}; {INGEST_FORECAST_HINT}"),
        )
        .into());
    }
    Ok((tail, future))
}

/// Train, evaluate and forecast `day`.
///
/// Every input is checked and every output staged before anything is
/// renamed into place. The model is committed last, so a run that fails
/// part-way never leaves a new model beside stale outputs.
pub fn train_predict_for(cfg: &Config, day: NaiveDate) -> Result<TrainPredictReport> {
    let paths = &cfg.paths;
    let table = load_feature_table(&paths.features())?;
    let (tail, future) = forecast_inputs(cfg, day)?;

    let model = ModelTrainer::new(cfg.training()).fit_table(&table)?;
    let evaluation = EvaluationProjector::project(&table, &model)?;
    let metrics = ForecastMetrics::from_evaluation(&evaluation)?;
    let forecast = RecursiveForecaster::new(&model).forecast(&tail, &future)?;

    commit_all(vec![
        outputs::stage_forecast(&forecast, &paths.tomorrow_forecast())?,
        outputs::stage_evaluation(&evaluation, &paths.evaluation())?,
        outputs::stage_importances(model.feature_importances(), &paths.feature_importance())?,
        model.stage(&paths.model())?,
    ])?;

    info!(
        model_id = %model.metadata().model_id,
        training_rows = table.len(),
        %day,
        hours = forecast.len(),
        mae = metrics.mae,
        "train and predict complete"
    );
    Ok(TrainPredictReport {
        training_rows: table.len(),
        evaluation: metrics,
        forecast_day: day,
        forecast_hours: forecast.len(),
    })
}

/// Forecast tomorrow with the saved model, without retraining.
pub fn predict(cfg: &Config) -> Result<usize> {
    predict_for(cfg, tomorrow(cfg)?)
}

/// Re-run only the recursive forecast for `day` from the saved model, e.g.
/// after a fresher weather forecast arrives.
pub fn predict_for(cfg: &Config, day: NaiveDate) -> Result<usize> {
    let model = RandomForestModel::load(&cfg.paths.model())?;
    let (tail, future) = forecast_inputs(cfg, day)?;
    let forecast = RecursiveForecaster::new(&model).forecast(&tail, &future)?;
    outputs::save_forecast(&forecast, &cfg.paths.tomorrow_forecast())?;

    info!(model_id = %model.metadata().model_id, %day, hours = forecast.len(), "forecast from saved model");
    Ok(forecast.len())
}

/// The [`PipelineError`] kind behind a failed stage, for the log line.
/// Failures raised outside the pipeline taxonomy, such as configuration
/// loading, are `Other`.
pub fn failure_kind(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(PipelineError::kind)
        .unwrap_or("Other")
}

/// All five stages in order, stopping at the first failure.
pub async fn run_all(cfg: &Config) -> Result<TrainPredictReport> {
    ingest_load(cfg).await.context("ingest-load")?;
    ingest_weather(cfg).await.context("ingest-weather")?;
    ingest_weather_forecast(cfg).await.context("ingest-weather-forecast")?;
    build_features(cfg).context("build-features")?;
    train_predict(cfg).context("train-predict")
}
