use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use energy_demand_forecast::{config, jobs, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "demand-forecast", version, about = "Next-day hourly electricity demand forecast")]
struct Cli {
    /// TOML configuration, overridable with DEMAND__* environment variables
    #[arg(long, short, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge recent system load into the load history
    IngestLoad,
    /// Merge archived hourly weather into the weather history
    IngestWeather,
    /// Replace the stored weather forecast
    IngestWeatherForecast,
    /// Join load and weather history into the feature table
    BuildFeatures,
    /// Train, evaluate and forecast tomorrow
    TrainPredict,
    /// Forecast tomorrow with the saved model
    Predict,
    /// Every stage in order
    RunAll,
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::IngestLoad => {
            let summary = jobs::ingest_load(&cfg).await?;
            info!(inserted = summary.inserted, total = summary.total, "ingest-load done");
        }
        Command::IngestWeather => {
            let summary = jobs::ingest_weather(&cfg).await?;
            info!(inserted = summary.inserted, total = summary.total, "ingest-weather done");
        }
        Command::IngestWeatherForecast => {
            let summary = jobs::ingest_weather_forecast(&cfg).await?;
            info!(rows = summary.total, "ingest-weather-forecast done");
        }
        Command::BuildFeatures => {
            let rows = jobs::build_features(&cfg)?;
            info!(rows, "build-features done");
        }
        Command::TrainPredict => {
            let report = jobs::train_predict(&cfg)?;
            info!(day = %report.forecast_day, hours = report.forecast_hours, "{}", report.evaluation);
        }
        Command::Predict => {
            let hours = jobs::predict(&cfg)?;
            info!(hours, "predict done");
        }
        Command::RunAll => {
            let report = jobs::run_all(&cfg).await?;
            info!(day = %report.forecast_day, hours = report.forecast_hours, "{}", report.evaluation);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(kind = jobs::failure_kind(&e), error = format!("{e:#}"), "pipeline failed");
        return Err(e);
    }
    Ok(())
}
