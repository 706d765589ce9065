//! Persisted, time-indexed tables
//!
//! Every artifact the batch jobs exchange is a parquet table keyed by a
//! `time` column. [`TimeSeriesStore`] owns the append/dedupe/sort discipline
//! for the observation histories; [`table`] holds the columnar IO shared by
//! all artifacts.

pub mod outputs;
pub mod table;
pub mod timeseries;

pub use timeseries::*;
