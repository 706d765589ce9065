//! Hourly electricity demand forecasting
//!
//! Batch pipeline: ingest load and weather into append-only hourly stores,
//! join them into a feature table, train a random forest and roll a
//! next-day forecast forward one hour at a time.

pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod jobs;
pub mod ml;
pub mod store;
pub mod telemetry;

pub use error::{PipelineError, PipelineResult};
