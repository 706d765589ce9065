//! NYISO real-time load provider
//!
//! Reads the public daily "pal" CSV files (one row per zone per 5-minute
//! interval) and sums the zones into system load.
//!
//! Timestamps are local wall-clock with an `EST`/`EDT` tag; on the autumn
//! changeover the 01:00 hour appears once under each tag. Every row is
//! resolved to its UTC instant through the tag, so the two passes stay apart.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use futures::future::try_join_all;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ObservationProvider, ProviderBatch, SyncWindow};
use crate::domain::Observation;
use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_BASE_URL: &str = "http://mis.nyiso.com/public/csv/pal";
const NAME: &str = "nyiso";
const TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";
const PUBLISHER_TZ: Tz = Tz::America__New_York;

#[derive(Debug, Deserialize)]
struct PalRecord {
    #[serde(rename = "Time Stamp")]
    time_stamp: String,
    #[serde(rename = "Time Zone")]
    time_zone: String,
    #[serde(rename = "Name")]
    zone: String,
    #[serde(rename = "Load")]
    load: Option<f64>,
}

pub struct NyisoLoadProvider {
    client: Client,
    base_url: String,
}

impl NyisoLoadProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::provider(NAME, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn day_url(&self, day: NaiveDate) -> String {
        format!("{}/{}pal.csv", self.base_url, day.format("%Y%m%d"))
    }

    async fn fetch_day(&self, day: NaiveDate) -> PipelineResult<String> {
        let url = self.day_url(day);
        debug!(%url, "fetching NYISO pal file");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::provider(NAME, format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::provider(
                NAME,
                format!("{url} returned {}", response.status()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| PipelineError::provider(NAME, format!("failed to read {url}: {e}")))
    }
}

/// UTC offset in hours east for a pal `Time Zone` tag.
fn utc_offset_hours(tag: &str) -> Option<i64> {
    match tag {
        "EST" => Some(-5),
        "EDT" => Some(-4),
        _ => None,
    }
}

/// System load per UTC instant from one pal file.
fn parse_pal(body: &str) -> PipelineResult<BTreeMap<NaiveDateTime, f64>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(body.as_bytes());
    let mut totals = BTreeMap::new();
    let mut skipped = 0usize;

    for record in reader.deserialize::<PalRecord>() {
        let record = record.map_err(|e| PipelineError::provider(NAME, format!("malformed pal row: {e}")))?;
        let local = NaiveDateTime::parse_from_str(&record.time_stamp, TIME_FORMAT).map_err(|e| {
            PipelineError::provider(NAME, format!("bad timestamp `{}`: {e}", record.time_stamp))
        })?;
        let offset = utc_offset_hours(&record.time_zone).ok_or_else(|| {
            PipelineError::provider(NAME, format!("unknown time zone tag `{}`", record.time_zone))
        })?;
        let instant = local - ChronoDuration::hours(offset);

        match record.load {
            Some(load) => *totals.entry(instant).or_insert(0.0) += load,
            None => {
                skipped += 1;
                debug!(zone = %record.zone, %local, tag = %record.time_zone, "empty zone load");
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, "skipped zone rows without a load value");
    }
    Ok(totals)
}

#[async_trait]
impl ObservationProvider for NyisoLoadProvider {
    fn name(&self) -> &str {
        NAME
    }

    /// Rows come back as UTC instants once the zone tag is applied.
    fn timezone(&self) -> Tz {
        Tz::UTC
    }

    async fn fetch(&self, window: &SyncWindow) -> PipelineResult<ProviderBatch> {
        // files are published per New York calendar day
        let first_day = window.start.with_timezone(&PUBLISHER_TZ).date_naive();
        let last_day = window.end.with_timezone(&PUBLISHER_TZ).date_naive();
        let start = window.start.naive_utc();
        let end = window.end.naive_utc();

        let days: Vec<NaiveDate> = first_day
            .iter_days()
            .take_while(|d| *d <= last_day)
            .collect();

        let bodies = try_join_all(days.iter().map(|d| self.fetch_day(*d))).await?;

        let mut totals = BTreeMap::new();
        for body in &bodies {
            totals.extend(parse_pal(body)?);
        }

        let records: Vec<Observation> = totals
            .into_iter()
            .filter(|(t, _)| *t >= start && *t <= end)
            .map(|(t, load)| Observation::single(t, load))
            .collect();

        info!(days = days.len(), rows = records.len(), "fetched NYISO load");
        Ok(ProviderBatch {
            fields: vec!["Load".to_string()],
            records,
        })
    }
}
