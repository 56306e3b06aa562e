//! Execution backends
//!
//! [`Backend`] is the capability surface the pipeline drives. Two
//! implementations exist:
//!
//! - [`EagerBackend`] holds a fully resident `DataFrame`; every operation runs
//!   immediately and `load` parses the whole file up front.
//! - [`DeferredBackend`] only reads the header on `load` and records derived
//!   columns as expressions. The source is staged into partition files and
//!   scanned the first time a query is forced (`group_count`,
//!   `top_n_by_frequency`, `materialize`).

use crate::config::{DeferredConfig, SourceConfig};
use crate::dates;
use crate::errors::{BenchError, BenchResult};
use crate::frequency::{FrequencyTable, COUNT_COLUMN};
use crate::io;
use crate::runner::{BackendKind, StageOutput};
use anyhow::anyhow;
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Result of a `load` call.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    /// Known only once rows are materialized.
    pub rows: Option<usize>,
    pub columns: Vec<String>,
    /// Malformed rows dropped, if the rows have been read.
    pub rows_skipped: Option<usize>,
    pub materialized: bool,
}

impl StageOutput for LoadSummary {
    fn row_count(&self) -> Option<usize> {
        self.rows
    }

    fn column_count(&self) -> Option<usize> {
        Some(self.columns.len())
    }

    fn materialized(&self) -> bool {
        self.materialized
    }

    fn columns(&self) -> Option<&[String]> {
        Some(&self.columns)
    }
}

/// Result of a `derive_year_column` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DeriveSummary {
    pub column: String,
    pub column_count: usize,
    pub materialized: bool,
}

impl StageOutput for DeriveSummary {
    fn column_count(&self) -> Option<usize> {
        Some(self.column_count)
    }

    fn materialized(&self) -> bool {
        self.materialized
    }
}

pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Read (or describe) the source. Replaces any previously loaded dataset.
    fn load(&mut self, source: &SourceConfig) -> BenchResult<LoadSummary>;

    /// Column names of the current dataset, derived columns included.
    fn columns(&self) -> Vec<String>;

    /// Append `target_column` holding the year of each `source_column` value.
    /// Values that are not dates become null.
    fn derive_year_column(
        &mut self,
        source_column: &str,
        target_column: &str,
    ) -> BenchResult<DeriveSummary>;

    /// Rows per distinct value of `column`, nulls included as their own group.
    fn group_count(&self, column: &str) -> BenchResult<FrequencyTable>;

    /// The `n` most frequent non-null values of `column`, descending, ties in first-seen order.
    fn top_n_by_frequency(&self, column: &str, n: usize) -> BenchResult<FrequencyTable>;

    /// The current dataset as a resident frame.
    fn materialize(&self) -> BenchResult<DataFrame>;
}

fn not_loaded(kind: BackendKind) -> BenchError {
    BenchError::Unknown(anyhow!("{} backend used before load", kind))
}

fn most_frequent_first() -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_order_descending(true)
        .with_maintain_order(true)
}

fn log_if_empty(table: FrequencyTable) -> FrequencyTable {
    if table.is_empty() {
        debug!("No non-null values in {}", table.column());
    }
    table
}

#[derive(Debug, Default)]
pub struct EagerBackend {
    frame: Option<DataFrame>,
}

impl EagerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(&self) -> BenchResult<&DataFrame> {
        self.frame.as_ref().ok_or_else(|| not_loaded(self.kind()))
    }
}

/// `[column, count]` with one row per distinct value, in first-seen order.
fn count_groups(df: &DataFrame, column: &str) -> PolarsResult<DataFrame> {
    #[allow(deprecated)]
    let mut counts = df.group_by_stable([column])?.select([column]).count()?;
    let count_name = counts.get_columns()[counts.width() - 1].name().clone();
    counts.rename(count_name.as_str(), COUNT_COLUMN.into())?;
    Ok(counts)
}

impl Backend for EagerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Eager
    }

    fn load(&mut self, source: &SourceConfig) -> BenchResult<LoadSummary> {
        info!("Reading {:?} into memory", source.path);
        let (df, stats) = io::read_eager(source)?;
        if stats.rows_skipped > 0 {
            warn!("{} malformed row(s) skipped while loading", stats.rows_skipped);
        }
        let summary = LoadSummary {
            rows: Some(df.height()),
            columns: column_names(&df),
            rows_skipped: Some(stats.rows_skipped),
            materialized: true,
        };
        self.frame = Some(df);
        Ok(summary)
    }

    fn columns(&self) -> Vec<String> {
        self.frame.as_ref().map(column_names).unwrap_or_default()
    }

    fn derive_year_column(
        &mut self,
        source_column: &str,
        target_column: &str,
    ) -> BenchResult<DeriveSummary> {
        let df = self.frame.as_mut().ok_or_else(|| not_loaded(BackendKind::Eager))?;
        let years = dates::years_of(df.column(source_column)?.as_materialized_series())?
            .with_name(target_column.into());
        df.with_column(years.into_series())?;
        Ok(DeriveSummary {
            column: target_column.to_string(),
            column_count: df.width(),
            materialized: true,
        })
    }

    fn group_count(&self, column: &str) -> BenchResult<FrequencyTable> {
        let counts = count_groups(self.frame()?, column)?;
        Ok(FrequencyTable::from_frame(&counts, column)?)
    }

    fn top_n_by_frequency(&self, column: &str, n: usize) -> BenchResult<FrequencyTable> {
        let df = self.frame()?;
        let present = df.filter(&df.column(column)?.is_not_null())?;
        let top = count_groups(&present, column)?
            .sort(vec![PlSmallStr::from_static(COUNT_COLUMN)], most_frequent_first())?
            .head(Some(n));
        Ok(log_if_empty(FrequencyTable::from_frame(&top, column)?))
    }

    fn materialize(&self) -> BenchResult<DataFrame> {
        Ok(self.frame()?.clone())
    }
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Partition files and the scan over them.
struct Staged {
    scan: LazyFrame,
    partitions: usize,
    // partition files live as long as the scan that reads them
    _dir: TempDir,
}

pub struct DeferredBackend {
    options: DeferredConfig,
    progress: bool,
    source: Option<SourceConfig>,
    columns: Vec<String>,
    /// Derived columns, applied in order on top of the scan.
    derived: Vec<Expr>,
    staged: RefCell<Option<Staged>>,
}

impl DeferredBackend {
    pub fn new(options: DeferredConfig, progress: bool) -> Self {
        Self {
            options,
            progress,
            source: None,
            columns: Vec::new(),
            derived: Vec::new(),
            staged: RefCell::new(None),
        }
    }

    /// Number of staged partition files; zero until the first force.
    pub fn partition_count(&self) -> usize {
        self.staged
            .borrow()
            .as_ref()
            .map(|staged| staged.partitions)
            .unwrap_or(0)
    }

    /// Build a query on top of the current plan and execute it.
    ///
    /// This is the only place the deferred backend does real work: the first
    /// call also stages the source into partition files.
    pub fn force<F>(&self, what: &str, build: F) -> BenchResult<DataFrame>
    where
        F: FnOnce(LazyFrame) -> LazyFrame,
    {
        let spinner = self.spinner(what)?;
        let result = self.plan().and_then(|plan| {
            let query = build(plan);
            let query = if self.options.streaming {
                query.with_streaming(true)
            } else {
                query
            };
            Ok(query.collect()?)
        });
        spinner.finish_and_clear();
        let df = result?;
        debug!("Forced {}: {} rows", what, df.height());
        Ok(df)
    }

    /// The partition scan with every derived column applied, staging on first use.
    fn plan(&self) -> BenchResult<LazyFrame> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| not_loaded(BackendKind::Deferred))?;
        let mut staged = self.staged.borrow_mut();
        if staged.is_none() {
            *staged = Some(self.stage(source)?);
        }
        let scan = staged
            .as_ref()
            .map(|s| s.scan.clone())
            .ok_or_else(|| not_loaded(BackendKind::Deferred))?;
        Ok(self
            .derived
            .iter()
            .cloned()
            .fold(scan, |lf, expr| lf.with_column(expr)))
    }

    fn stage(&self, source: &SourceConfig) -> BenchResult<Staged> {
        let dir = self.staging_dir()?;
        let staged = io::stage_partitions(source, dir.path(), self.options.partition_size.0)?;
        if staged.stats.rows_skipped > 0 {
            warn!(
                "{} malformed row(s) skipped while staging",
                staged.stats.rows_skipped
            );
        }

        // Partitions infer their schemas independently; pinning keeps the
        // identifier columns textual in every partition.
        let pinned: Vec<Field> = source
            .string_columns
            .iter()
            .filter(|name| staged.columns.contains(*name))
            .map(|name| Field::new(name.as_str().into(), DataType::String))
            .collect();
        let overwrite: Option<SchemaRef> = if pinned.is_empty() {
            None
        } else {
            Some(Arc::new(Schema::from_iter(pinned)))
        };

        let scans = staged
            .partitions
            .iter()
            .map(|part| {
                LazyCsvReader::new(part)
                    .with_has_header(true)
                    .with_infer_schema_length(self.options.infer_schema_rows)
                    .with_dtype_overwrite(overwrite.clone())
                    .finish()
            })
            .collect::<PolarsResult<Vec<_>>>()?;
        let scan = concat(
            scans,
            UnionArgs {
                to_supertypes: true,
                ..Default::default()
            },
        )?;
        Ok(Staged {
            scan,
            partitions: staged.partitions.len(),
            _dir: dir,
        })
    }

    fn spinner(&self, what: &str) -> BenchResult<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .map_err(|e| BenchError::Unknown(e.into()))?,
        );
        pb.set_message(format!("Computing {}...", what));
        pb.enable_steady_tick(Duration::from_millis(100));
        Ok(pb)
    }

    fn staging_dir(&self) -> BenchResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dualbench-");
        let dir = match &self.options.staging_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

impl Backend for DeferredBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Deferred
    }

    fn load(&mut self, source: &SourceConfig) -> BenchResult<LoadSummary> {
        info!(
            "Describing {:?} as partitions of {}",
            source.path, self.options.partition_size
        );
        let columns = io::read_header(source)?;

        // the previous dataset's partitions go with it
        self.staged.replace(None);
        self.derived.clear();
        self.columns = columns.clone();
        self.source = Some(source.clone());
        Ok(LoadSummary {
            rows: None,
            columns,
            rows_skipped: None,
            materialized: false,
        })
    }

    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn derive_year_column(
        &mut self,
        source_column: &str,
        target_column: &str,
    ) -> BenchResult<DeriveSummary> {
        if self.source.is_none() {
            return Err(not_loaded(BackendKind::Deferred));
        }
        let years = col(source_column)
            .map(
                |c: Column| {
                    let years = dates::years_of(c.as_materialized_series())?;
                    Ok(Some(Column::from(years.into_series())))
                },
                GetOutput::from_type(DataType::Int32),
            )
            .alias(target_column);
        self.derived.push(years);
        if !self.columns.iter().any(|c| c == target_column) {
            self.columns.push(target_column.to_string());
        }
        Ok(DeriveSummary {
            column: target_column.to_string(),
            column_count: self.columns.len(),
            materialized: false,
        })
    }

    fn group_count(&self, column: &str) -> BenchResult<FrequencyTable> {
        let df = self.force(&format!("group count of {}", column), |plan| {
            plan.group_by_stable([col(column)])
                .agg([len().alias(COUNT_COLUMN)])
        })?;
        Ok(FrequencyTable::from_frame(&df, column)?)
    }

    fn top_n_by_frequency(&self, column: &str, n: usize) -> BenchResult<FrequencyTable> {
        let df = self.force(&format!("top {} of {}", n, column), |plan| {
            plan.filter(col(column).is_not_null())
                .group_by_stable([col(column)])
                .agg([len().alias(COUNT_COLUMN)])
                .sort(vec![PlSmallStr::from_static(COUNT_COLUMN)], most_frequent_first())
                .limit(n as IdxSize)
        })?;
        Ok(log_if_empty(FrequencyTable::from_frame(&df, column)?))
    }

    fn materialize(&self) -> BenchResult<DataFrame> {
        self.force("dataset", |plan| plan)
    }
}
