//! Pulling observations from external providers into stores
//!
//! A provider returns raw, possibly sub-hourly rows with the source's own
//! column names and clock. [`IngestionSync`] maps them onto a store schema,
//! moves them onto the configured local clock, resamples to hourly means and
//! merges.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::domain::Observation;
use crate::error::PipelineResult;

pub mod nyiso;
pub mod open_meteo;
pub mod schema;
pub mod sync;

pub use nyiso::NyisoLoadProvider;
pub use open_meteo::{OpenMeteoEndpoint, OpenMeteoProvider};
pub use schema::{FieldSpec, SeriesSchema};
pub use sync::IngestionSync;

/// Time range to pull, as absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` before `now`, up to `now`.
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now - chrono::Duration::days(i64::from(days)),
            end: now,
        }
    }
}

/// Rows as a provider delivered them. `records[i].values` follows `fields`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderBatch {
    pub fields: Vec<String>,
    pub records: Vec<Observation>,
}

#[async_trait]
pub trait ObservationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Zone of the naive timestamps this provider returns.
    fn timezone(&self) -> Tz;

    /// Fails with a provider error on transport, timeout or payload problems.
    async fn fetch(&self, window: &SyncWindow) -> PipelineResult<ProviderBatch>;
}
