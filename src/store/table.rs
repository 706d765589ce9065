use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use tempfile::NamedTempFile;

use crate::error::{PipelineError, PipelineResult};

/// Read a parquet table. Callers decide what a missing file means.
pub fn read_frame(path: &Path) -> PipelineResult<DataFrame> {
    let file = File::open(path)?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| PipelineError::storage(path, format!("reading parquet: {e}")))
}

/// A fully written file waiting beside its target. Dropping it without
/// [`Staged::commit`] removes the temporary file and leaves the target alone.
#[derive(Debug)]
pub struct Staged {
    file: NamedTempFile,
    target: PathBuf,
}

impl Staged {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename into place; readers see either the old file or the new one.
    pub fn commit(self) -> PipelineResult<()> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| PipelineError::storage(&target, e.error))?;
        Ok(())
    }
}

/// Commit in order, stopping at the first failure.
pub fn commit_all(staged: Vec<Staged>) -> PipelineResult<()> {
    staged.into_iter().try_for_each(Staged::commit)
}

fn stage_with(
    path: &Path,
    write: impl FnOnce(&mut File) -> PipelineResult<()>,
) -> PipelineResult<Staged> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    write(file.as_file_mut())?;
    file.as_file_mut().flush()?;
    file.as_file().sync_all()?;
    Ok(Staged {
        file,
        target: path.to_path_buf(),
    })
}

/// Write `bytes` next to `path` without touching `path` yet.
pub fn stage_bytes(bytes: &[u8], path: &Path) -> PipelineResult<Staged> {
    stage_with(path, |f| Ok(f.write_all(bytes)?))
}

/// Write `df` as parquet next to `path` without touching `path` yet.
pub fn stage_frame(df: &mut DataFrame, path: &Path) -> PipelineResult<Staged> {
    stage_with(path, |f| {
        ParquetWriter::new(f)
            .finish(df)
            .map(|_| ())
            .map_err(|e| PipelineError::storage(path, format!("writing parquet: {e}")))
    })
}

/// Write `df` next to `path` and rename it into place, so readers only ever
/// see the previous table or the complete new one.
pub fn write_frame_atomic(df: &mut DataFrame, path: &Path) -> PipelineResult<()> {
    stage_frame(df, path)?.commit()
}

/// Check that every column in `required` exists, naming the ones that don't.
pub fn require_columns(df: &DataFrame, required: &[&str], path: &Path) -> PipelineResult<()> {
    let present = df.get_column_names();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Schema(format!(
            "missing columns in {}: {:?} (found {:?})",
            path.display(),
            missing,
            present
        )))
    }
}

pub fn time_series(name: &str, times: &[NaiveDateTime]) -> PolarsResult<Series> {
    let millis: Vec<i64> = times
        .iter()
        .map(|t| t.and_utc().timestamp_millis())
        .collect();
    Series::new(name, millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

pub fn read_times(df: &DataFrame, name: &str, path: &Path) -> PipelineResult<Vec<NaiveDateTime>> {
    let schema_err = |e: PolarsError| {
        PipelineError::Schema(format!("column `{name}` in {}: {e}", path.display()))
    };
    let millis = df
        .column(name)
        .map_err(schema_err)?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .and_then(|s| s.cast(&DataType::Int64))
        .map_err(schema_err)?;
    let millis = millis.i64().map_err(schema_err)?;

    millis
        .into_iter()
        .enumerate()
        .map(|(row, ms)| {
            ms.and_then(DateTime::from_timestamp_millis)
                .map(|t| t.naive_utc())
                .ok_or_else(|| {
                    PipelineError::Schema(format!(
                        "unparseable `{name}` at row {row} in {}",
                        path.display()
                    ))
                })
        })
        .collect()
}

pub fn read_f64s(df: &DataFrame, name: &str, path: &Path) -> PipelineResult<Vec<f64>> {
    let schema_err = |e: PolarsError| {
        PipelineError::Schema(format!("column `{name}` in {}: {e}", path.display()))
    };
    let values = df
        .column(name)
        .map_err(schema_err)?
        .cast(&DataType::Float64)
        .map_err(schema_err)?;
    let values = values.f64().map_err(schema_err)?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                PipelineError::Schema(format!(
                    "non-numeric `{name}` at row {row} in {}",
                    path.display()
                ))
            })
        })
        .collect()
}

pub fn frame(path: &Path, columns: Vec<Series>) -> PipelineResult<DataFrame> {
    DataFrame::new(columns).map_err(|e| PipelineError::storage(path, e))
}
