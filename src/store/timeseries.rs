use std::{collections::BTreeMap, path::Path};

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info};

use super::table::{self, frame, read_f64s, read_times, require_columns, time_series};
use crate::domain::{is_hour_aligned, Observation, TIME_COLUMN};
use crate::error::{PipelineError, PipelineResult};

/// Append-only, deduplicated, time-indexed history.
///
/// Rows live in a `BTreeMap` keyed by timestamp, so iteration is always
/// strictly increasing and a timestamp can never appear twice. Merging the
/// same batch twice, or two batches that agree on shared timestamps in
/// either order, yields the same store.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesStore {
    fields: Vec<String>,
    rows: BTreeMap<NaiveDateTime, Vec<f64>>,
}

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub total: usize,
}

impl TimeSeriesStore {
    pub fn empty(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            rows: BTreeMap::new(),
        }
    }

    /// Load persisted state, or an empty store on first run.
    pub fn load(path: &Path, fields: &[&str]) -> PipelineResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no prior state, starting empty");
            return Ok(Self::empty(fields));
        }
        Self::read(path, fields)
    }

    /// Load persisted state that an upstream stage must already have produced.
    pub fn require(path: &Path, fields: &[&str], hint: &str) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::missing(path, hint));
        }
        let store = Self::read(path, fields)?;
        if store.is_empty() {
            return Err(PipelineError::missing(path, format!("file has no rows; {hint}")));
        }
        Ok(store)
    }

    fn read(path: &Path, fields: &[&str]) -> PipelineResult<Self> {
        let df = table::read_frame(path)?;
        let mut required = vec![TIME_COLUMN];
        required.extend_from_slice(fields);
        require_columns(&df, &required, path)?;

        let times = read_times(&df, TIME_COLUMN, path)?;
        let columns = fields
            .iter()
            .map(|f| read_f64s(&df, f, path))
            .collect::<PipelineResult<Vec<_>>>()?;

        let batch = times
            .into_iter()
            .enumerate()
            .map(|(i, time)| Observation::new(time, columns.iter().map(|c| c[i]).collect()));

        let mut store = Self::empty(fields);
        store.merge(batch)?;
        Ok(store)
    }

    /// Merge a batch: later values win on duplicate timestamps, order is
    /// restored by construction. The whole batch is validated before any row
    /// is applied, so a malformed batch leaves the store unchanged.
    pub fn merge(
        &mut self,
        batch: impl IntoIterator<Item = Observation>,
    ) -> PipelineResult<MergeSummary> {
        let batch: Vec<Observation> = batch.into_iter().collect();
        for obs in &batch {
            self.validate(obs)?;
        }

        let mut summary = MergeSummary::default();
        for obs in batch {
            match self.rows.insert(obs.time, obs.values) {
                Some(_) => summary.replaced += 1,
                None => summary.inserted += 1,
            }
        }
        summary.total = self.rows.len();
        Ok(summary)
    }

    fn validate(&self, obs: &Observation) -> PipelineResult<()> {
        if obs.values.len() != self.fields.len() {
            return Err(PipelineError::Schema(format!(
                "observation at {} has {} values, store fields are {:?}",
                obs.time,
                obs.values.len(),
                self.fields
            )));
        }
        if let Some((field, value)) = self
            .fields
            .iter()
            .zip(&obs.values)
            .find(|(_, v)| !v.is_finite())
        {
            return Err(PipelineError::Schema(format!(
                "non-numeric `{field}` ({value}) at {}",
                obs.time
            )));
        }
        if !is_hour_aligned(obs.time) {
            return Err(PipelineError::Schema(format!(
                "timestamp {} is not hour-aligned",
                obs.time
            )));
        }
        Ok(())
    }

    /// Rows whose calendar date lies in `[start, end]`. Empty if none do.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Vec<Observation> {
        let (Some(lo), Some(hi)) = (
            start.and_hms_opt(0, 0, 0),
            end.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)),
        ) else {
            return Vec::new();
        };
        if lo >= hi {
            return Vec::new();
        }
        self.rows
            .range(lo..hi)
            .map(|(t, v)| Observation::new(*t, v.clone()))
            .collect()
    }

    /// Persist the whole store, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let times: Vec<NaiveDateTime> = self.rows.keys().copied().collect();
        let mut columns = vec![time_series(TIME_COLUMN, &times)
            .map_err(|e| PipelineError::storage(path, e))?];
        for (i, field) in self.fields.iter().enumerate() {
            let values: Vec<f64> = self.rows.values().map(|v| v[i]).collect();
            columns.push(Series::new(field, values));
        }

        let mut df = frame(path, columns)?;
        table::write_frame_atomic(&mut df, path)?;
        info!(
            path = %path.display(),
            rows = self.len(),
            first = ?self.first_time(),
            last = ?self.last_time(),
            "saved store"
        );
        Ok(())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_time(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next().copied()
    }

    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next_back().copied()
    }

    pub fn get(&self, time: &NaiveDateTime) -> Option<&[f64]> {
        self.rows.get(time).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, &[f64])> + '_ {
        self.rows.iter().map(|(t, v)| (*t, v.as_slice()))
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.iter()
            .map(|(t, v)| Observation::new(t, v.to_vec()))
            .collect()
    }

    /// All values of one field, in time order.
    pub fn column(&self, field: &str) -> Option<Vec<f64>> {
        let idx = self.fields.iter().position(|f| f == field)?;
        Some(self.rows.values().map(|v| v[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use itertools::Itertools;
    use proptest::prelude::*;

    fn hour(h: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(h)
    }

    fn load_store(points: &[(i64, f64)]) -> TimeSeriesStore {
        let mut store = TimeSeriesStore::empty(&["load"]);
        store
            .merge(points.iter().map(|(h, v)| Observation::single(hour(*h), *v)))
            .unwrap();
        store
    }

    #[test]
    fn test_merge_dedupes_and_sorts() {
        let mut store = load_store(&[(3, 30.0), (1, 10.0)]);
        let summary = store
            .merge(vec![
                Observation::single(hour(2), 20.0),
                Observation::single(hour(1), 11.0),
            ])
            .unwrap();

        assert_eq!(summary, MergeSummary { inserted: 1, replaced: 1, total: 3 });
        assert_eq!(store.column("load").unwrap(), vec![11.0, 20.0, 30.0]);
        assert_eq!(store.first_time(), Some(hour(1)));
        assert_eq!(store.last_time(), Some(hour(3)));
    }

    #[test]
    fn test_later_value_wins_within_one_batch() {
        let store = load_store(&[(0, 1.0), (0, 2.0)]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&hour(0)), Some(&[2.0][..]));
    }

    #[test]
    fn test_malformed_batch_leaves_store_unchanged() {
        let mut store = load_store(&[(0, 1.0), (1, 2.0)]);
        let before = store.clone();

        let nan = store.merge(vec![
            Observation::single(hour(2), 3.0),
            Observation::single(hour(3), f64::NAN),
        ]);
        assert!(matches!(nan, Err(PipelineError::Schema(_))));
        assert_eq!(store, before);

        let wide = store.merge(vec![Observation::new(hour(2), vec![1.0, 2.0])]);
        assert!(matches!(wide, Err(PipelineError::Schema(_))));

        let off_hour = store.merge(vec![Observation::single(hour(2) + Duration::minutes(5), 1.0)]);
        assert!(matches!(off_hour, Err(PipelineError::Schema(_))));
        assert_eq!(store, before);
    }

    #[test]
    fn test_slice_is_date_inclusive() {
        // hours 0..72 span 2024-01-01 .. 2024-01-03
        let store = load_store(&(0..72).map(|h| (h, h as f64)).collect::<Vec<_>>());
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();

        let day2 = store.slice(d(2), d(2));
        assert_eq!(day2.len(), 24);
        assert_eq!(day2[0].time, hour(24));
        assert_eq!(day2[23].time, hour(47));

        assert_eq!(store.slice(d(1), d(3)).len(), 72);
        assert!(store.slice(d(10), d(12)).is_empty());
        assert!(store.slice(d(3), d(1)).is_empty());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimeSeriesStore::load(&dir.path().join("nope.parquet"), &["load"]).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.fields(), &["load".to_string()]);
    }

    #[test]
    fn test_require_missing_file_is_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = TimeSeriesStore::require(
            &dir.path().join("load_hourly.parquet"),
            &["load"],
            "run `demand-forecast ingest-load`",
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingArtifact { .. }));
        assert!(err.to_string().contains("ingest-load"));
    }

    #[test]
    fn test_save_then_load_grows_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed/weather_hourly.parquet");
        let fields = ["temperature_2m", "relative_humidity_2m", "precipitation"];

        let mut first = TimeSeriesStore::load(&path, &fields).unwrap();
        first
            .merge((0..5).map(|h| Observation::new(hour(h), vec![h as f64, 50.0, 0.0])))
            .unwrap();
        first.save(&path).unwrap();

        let mut second = TimeSeriesStore::load(&path, &fields).unwrap();
        assert_eq!(second, first);
        second
            .merge((3..8).map(|h| Observation::new(hour(h), vec![h as f64, 50.0, 0.0])))
            .unwrap();
        second.save(&path).unwrap();

        let reloaded = TimeSeriesStore::load(&path, &fields).unwrap();
        assert_eq!(reloaded.len(), 8);
        assert_eq!(reloaded.first_time(), Some(hour(0)));
        assert_eq!(reloaded.last_time(), Some(hour(7)));
    }

    fn batch_strategy() -> impl Strategy<Value = Vec<(i64, f64)>> {
        // values are a pure function of the timestamp so overlapping batches agree
        prop::collection::vec(0i64..200, 0..60)
            .prop_map(|hours| hours.into_iter().map(|h| (h, (h * 7 % 13) as f64)).collect())
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent_and_commutative(a in batch_strategy(), b in batch_strategy()) {
            let obs = |pts: &Vec<(i64, f64)>| {
                pts.iter().map(|(h, v)| Observation::single(hour(*h), *v)).collect::<Vec<_>>()
            };

            let mut ab = TimeSeriesStore::empty(&["load"]);
            ab.merge(obs(&a)).unwrap();
            ab.merge(obs(&b)).unwrap();

            let mut ba = TimeSeriesStore::empty(&["load"]);
            ba.merge(obs(&b)).unwrap();
            ba.merge(obs(&a)).unwrap();
            prop_assert_eq!(&ab, &ba);

            let mut again = ab.clone();
            again.merge(obs(&b)).unwrap();
            again.merge(obs(&a)).unwrap();
            prop_assert_eq!(&again, &ab);

            let unique = a.iter().chain(&b).map(|(h, _)| *h).unique().count();
            prop_assert_eq!(ab.len(), unique);
        }

        #[test]
        fn prop_iteration_strictly_increasing(a in batch_strategy()) {
            let mut store = TimeSeriesStore::empty(&["load"]);
            store.merge(a.iter().map(|(h, v)| Observation::single(hour(*h), *v))).unwrap();
            prop_assert!(store.iter().tuple_windows().all(|((t0, _), (t1, _))| t0 < t1));
        }
    }
}
