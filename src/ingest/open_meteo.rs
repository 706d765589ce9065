//! Weather observations and forecasts from Open-Meteo
//!
//! Both endpoints take the configured zone as `timezone` and answer with
//! naive local times, so the provider declares that zone.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ObservationProvider, ProviderBatch, SyncWindow};
use crate::domain::{Observation, WEATHER_FIELDS};
use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Which Open-Meteo API to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMeteoEndpoint {
    /// Historical reanalysis over the window's dates.
    Archive,
    /// Upcoming hours; only rows after the window start are kept.
    Forecast { days: u32 },
}

pub struct OpenMeteoProvider {
    client: Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
    timezone: Tz,
    endpoint: OpenMeteoEndpoint,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    #[serde(flatten)]
    variables: BTreeMap<String, Vec<Option<f64>>>,
}

impl OpenMeteoProvider {
    pub fn new(
        base_url: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timezone: Tz,
        endpoint: OpenMeteoEndpoint,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::provider("open-meteo", format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            latitude,
            longitude,
            timezone,
            endpoint,
        })
    }

    fn query(&self, window: &SyncWindow) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("hourly", WEATHER_FIELDS.join(",")),
            ("timezone", self.timezone.name().to_string()),
        ];
        match self.endpoint {
            OpenMeteoEndpoint::Archive => {
                let start = window.start.with_timezone(&self.timezone).date_naive();
                let end = window.end.with_timezone(&self.timezone).date_naive();
                query.push(("start_date", start.format("%Y-%m-%d").to_string()));
                query.push(("end_date", end.format("%Y-%m-%d").to_string()));
            }
            OpenMeteoEndpoint::Forecast { days } => {
                query.push(("forecast_days", days.to_string()));
            }
        }
        query
    }

    fn parse(&self, hourly: HourlyBlock, window: &SyncWindow) -> PipelineResult<ProviderBatch> {
        let n = hourly.time.len();
        if let Some((name, values)) = hourly.variables.iter().find(|(_, v)| v.len() != n) {
            return Err(PipelineError::provider(
                self.name(),
                format!("`{name}` has {} values for {n} timestamps", values.len()),
            ));
        }

        let after = match self.endpoint {
            OpenMeteoEndpoint::Archive => None,
            OpenMeteoEndpoint::Forecast { .. } => {
                Some(window.start.with_timezone(&self.timezone).naive_local())
            }
        };

        let fields: Vec<String> = hourly.variables.keys().cloned().collect();
        let mut records = Vec::with_capacity(n);
        let mut incomplete = 0usize;

        for (i, raw) in hourly.time.iter().enumerate() {
            let time = NaiveDateTime::parse_from_str(raw, TIME_FORMAT).map_err(|e| {
                PipelineError::provider(self.name(), format!("bad timestamp `{raw}`: {e}"))
            })?;
            if after.is_some_and(|now| time <= now) {
                continue;
            }
            let values: Option<Vec<f64>> = hourly.variables.values().map(|v| v[i]).collect();
            match values {
                Some(values) => records.push(Observation::new(time, values)),
                None => incomplete += 1,
            }
        }

        if incomplete > 0 {
            warn!(provider = self.name(), incomplete, "dropped hours with missing weather values");
        }
        Ok(ProviderBatch { fields, records })
    }
}

#[async_trait]
impl ObservationProvider for OpenMeteoProvider {
    fn name(&self) -> &str {
        match self.endpoint {
            OpenMeteoEndpoint::Archive => "open-meteo-archive",
            OpenMeteoEndpoint::Forecast { .. } => "open-meteo-forecast",
        }
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }

    async fn fetch(&self, window: &SyncWindow) -> PipelineResult<ProviderBatch> {
        let query = self.query(window);
        debug!(url = %self.base_url, ?query, "fetching Open-Meteo hourly weather");

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| PipelineError::provider(self.name(), format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::provider(
                self.name(),
                format!("API returned {}", response.status()),
            ));
        }

        let body: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::provider(self.name(), format!("failed to parse response: {e}")))?;

        let batch = self.parse(body.hourly, window)?;
        info!(
            provider = self.name(),
            latitude = self.latitude,
            longitude = self.longitude,
            rows = batch.records.len(),
            "fetched weather"
        );
        Ok(batch)
    }
}
