use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use tracing::{info, warn};

use super::{ObservationProvider, ProviderBatch, SeriesSchema, SyncWindow};
use crate::domain::{floor_to_hour, Observation};
use crate::error::{PipelineError, PipelineResult};
use crate::store::{MergeSummary, TimeSeriesStore};

/// Pulls one provider into one store.
pub struct IngestionSync {
    schema: SeriesSchema,
    /// Local clock every store is kept on.
    timezone: Tz,
}

impl IngestionSync {
    pub fn new(schema: SeriesSchema, timezone: Tz) -> Self {
        Self { schema, timezone }
    }

    /// Fetch `window` and merge it into `store`.
    ///
    /// Provider failures propagate before the store is touched; a batch that
    /// fails normalization or validation is rejected as a whole.
    pub async fn sync(
        &self,
        provider: &dyn ObservationProvider,
        store: &mut TimeSeriesStore,
        window: &SyncWindow,
    ) -> PipelineResult<MergeSummary> {
        let expected = self.schema.field_names();
        if store.fields().iter().map(String::as_str).ne(expected.iter().copied()) {
            return Err(PipelineError::Schema(format!(
                "store fields {:?} do not match ingestion schema {:?}",
                store.fields(),
                expected
            )));
        }

        let batch = provider.fetch(window).await?;
        let raw_rows = batch.records.len();
        let hourly = self.normalize(provider, batch)?;
        if hourly.is_empty() {
            warn!(provider = provider.name(), start = %window.start, end = %window.end, "provider returned no rows");
        }

        let summary = store.merge(hourly)?;
        info!(
            provider = provider.name(),
            raw_rows,
            inserted = summary.inserted,
            replaced = summary.replaced,
            total = summary.total,
            first = ?store.first_time(),
            last = ?store.last_time(),
            "merged provider batch"
        );
        Ok(summary)
    }

    /// Map columns onto the schema, move onto the local clock and resample
    /// to hourly means.
    pub fn normalize(
        &self,
        provider: &dyn ObservationProvider,
        batch: ProviderBatch,
    ) -> PipelineResult<Vec<Observation>> {
        let columns = self.schema.resolve(&batch.fields).map_err(|missing| {
            PipelineError::provider(
                provider.name(),
                format!("no column for `{missing}`; columns were {:?}", batch.fields),
            )
        })?;

        let source_tz = provider.timezone();
        let mut buckets: BTreeMap<NaiveDateTime, (Vec<f64>, usize)> = BTreeMap::new();
        let mut dropped = 0usize;

        for record in batch.records {
            if record.values.len() != batch.fields.len() {
                return Err(PipelineError::provider(
                    provider.name(),
                    format!(
                        "row at {} has {} values for {} columns",
                        record.time,
                        record.values.len(),
                        batch.fields.len()
                    ),
                ));
            }
            let Some(local) = self.to_local(source_tz, record.time) else {
                dropped += 1;
                continue;
            };

            let entry = buckets
                .entry(floor_to_hour(local))
                .or_insert_with(|| (vec![0.0; columns.len()], 0));
            for (sum, (idx, scale)) in entry.0.iter_mut().zip(&columns) {
                *sum += record.values[*idx] * scale;
            }
            entry.1 += 1;
        }

        if dropped > 0 {
            warn!(
                provider = provider.name(),
                dropped,
                source_tz = %source_tz,
                "dropped timestamps that do not exist in the source zone"
            );
        }

        Ok(buckets
            .into_iter()
            .map(|(time, (sums, count))| {
                Observation::new(time, sums.into_iter().map(|s| s / count as f64).collect())
            })
            .collect())
    }

    /// Re-express a naive source-zone timestamp on the configured local clock.
    /// Ambiguous (fall-back) times take the earlier instant; times skipped by
    /// a spring-forward transition yield `None`.
    fn to_local(&self, source_tz: Tz, time: NaiveDateTime) -> Option<NaiveDateTime> {
        if source_tz == self.timezone {
            return Some(time);
        }
        source_tz
            .from_local_datetime(&time)
            .earliest()
            .map(|t| t.with_timezone(&self.timezone).naive_local())
    }
}
