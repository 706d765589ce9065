use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::ingest::{nyiso, open_meteo};
use crate::ml::TrainingConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "DEMAND__";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub location: LocationConfig,
    #[serde(default)]
    #[validate(nested)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    #[validate(nested)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    #[validate(nested)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationConfig {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// IANA zone every stored timestamp is expressed in.
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: String,
}

impl LocationConfig {
    pub fn tz(&self) -> Result<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|e| anyhow::anyhow!("invalid timezone `{}`: {e}", self.timezone))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    #[validate(range(min = 1))]
    pub lookback_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { lookback_days: 14 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data") }
    }
}

impl PathsConfig {
    fn processed(&self, file: &str) -> PathBuf {
        self.data_dir.join("processed").join(file)
    }

    pub fn load_history(&self) -> PathBuf {
        self.processed("load_hourly.parquet")
    }

    pub fn weather_history(&self) -> PathBuf {
        self.processed("weather_hourly.parquet")
    }

    pub fn weather_forecast(&self) -> PathBuf {
        self.processed("weather_forecast.parquet")
    }

    pub fn features(&self) -> PathBuf {
        self.processed("features_history.parquet")
    }

    pub fn feature_importance(&self) -> PathBuf {
        self.processed("feature_importance.parquet")
    }

    pub fn evaluation(&self) -> PathBuf {
        self.processed("predictions_eval.parquet")
    }

    pub fn tomorrow_forecast(&self) -> PathBuf {
        self.processed("tomorrow_predictions.parquet")
    }

    pub fn model(&self) -> PathBuf {
        self.data_dir.join("models").join("rf_model.bin")
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ProvidersConfig {
    #[validate(range(min = 1))]
    pub http_timeout_seconds: u64,
    #[validate(url)]
    pub nyiso_base_url: String,
    #[validate(url)]
    pub weather_archive_url: String,
    #[validate(url)]
    pub weather_forecast_url: String,
    #[validate(range(min = 2, max = 16))]
    pub forecast_days: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 60,
            nyiso_base_url: nyiso::DEFAULT_BASE_URL.to_string(),
            weather_archive_url: open_meteo::DEFAULT_ARCHIVE_URL.to_string(),
            weather_forecast_url: open_meteo::DEFAULT_FORECAST_URL.to_string(),
            forecast_days: 2,
        }
    }
}

impl ProvidersConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ModelConfig {
    #[validate(range(min = 1))]
    pub n_trees: usize,
    #[validate(range(min = 1))]
    pub max_depth: Option<u16>,
    #[validate(range(min = 2))]
    pub min_samples_split: usize,
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let defaults = TrainingConfig::default();
        Self {
            n_trees: defaults.n_trees,
            max_depth: defaults.max_depth,
            min_samples_split: defaults.min_samples_split,
            min_samples_leaf: defaults.min_samples_leaf,
            seed: defaults.seed,
        }
    }
}

impl From<&ModelConfig> for TrainingConfig {
    fn from(m: &ModelConfig) -> Self {
        TrainingConfig {
            n_trees: m.n_trees,
            max_depth: m.max_depth,
            min_samples_split: m.min_samples_split,
            min_samples_leaf: m.min_samples_leaf,
            seed: m.seed,
        }
    }
}

fn validate_timezone(timezone: &str) -> Result<(), ValidationError> {
    Tz::from_str(timezone)
        .map(|_| ())
        .map_err(|_| ValidationError::new("unknown_timezone"))
}

impl Config {
    /// TOML file at `path` (optional) overlaid with `DEMAND__*` environment
    /// variables, then validated.
    pub fn load(path: &Path) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("failed to read configuration")?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.location.tz()
    }

    pub fn training(&self) -> TrainingConfig {
        TrainingConfig::from(&self.model)
    }
}
