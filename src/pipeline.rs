//! The comparison run
//!
//! [`AnalysisPipeline`] walks the fixed stage sequence (load, derive year,
//! group count by year, top-n frequency) and runs every stage on each backend
//! in turn, eager first. Each invocation goes through the
//! [`BenchmarkRunner`] and is rendered as soon as it finishes, so a fatal
//! error part-way leaves the earlier stages on screen.

use crate::config::BenchConfig;
use crate::engine::{Backend, DeferredBackend, EagerBackend};
use crate::errors::{BenchError, BenchResult};
use crate::frequency::ResultSummary;
use crate::io;
use crate::observability::{MemoryProbe, ProcessMemory};
use crate::report;
use crate::runner::{BackendKind, BenchmarkRunner, Measurement, StageOutput};
use std::io::Write;
use tracing::{debug, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    DeriveYear,
    GroupCountByYear,
    TopNFrequency,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Load,
        Stage::DeriveYear,
        Stage::GroupCountByYear,
        Stage::TopNFrequency,
    ];

    /// Stable identifier used in measurements and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::DeriveYear => "derive_year",
            Stage::GroupCountByYear => "group_count_by_year",
            Stage::TopNFrequency => "top_n_frequency",
        }
    }

    fn label(&self, config: &BenchConfig) -> String {
        let analysis = &config.analysis;
        match self {
            Stage::Load => format!("Load {}", config.source.path.display()),
            Stage::DeriveYear => format!(
                "Derive {} from {}",
                analysis.year_column, analysis.date_column
            ),
            Stage::GroupCountByYear => format!("Group count by {}", analysis.year_column),
            Stage::TopNFrequency => format!(
                "Top {} by frequency of {}",
                analysis.top_n, analysis.frequency_column
            ),
        }
    }
}

/// Preview produced by one (stage, backend) execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub stage: Stage,
    pub backend: BackendKind,
    pub summary: ResultSummary,
}

/// Everything one run produced, in execution order.
#[derive(Debug, Clone, Default)]
pub struct BenchReport {
    pub measurements: Vec<Measurement>,
    pub summaries: Vec<StageSummary>,
    /// Diagnostics for skipped stages.
    pub notes: Vec<String>,
}

impl BenchReport {
    pub fn measurements_for(&self, stage: Stage) -> Vec<&Measurement> {
        self.measurements
            .iter()
            .filter(|m| m.stage() == stage.name())
            .collect()
    }

    pub fn summary_for(&self, stage: Stage, backend: BackendKind) -> Option<&ResultSummary> {
        self.summaries
            .iter()
            .find(|s| s.stage == stage && s.backend == backend)
            .map(|s| &s.summary)
    }
}

pub struct AnalysisPipeline<P: MemoryProbe> {
    config: BenchConfig,
    runner: BenchmarkRunner<P>,
}

impl AnalysisPipeline<ProcessMemory> {
    /// Pipeline measuring this process's resident memory.
    pub fn with_process_memory(config: BenchConfig) -> BenchResult<Self> {
        Ok(Self::new(config, ProcessMemory::new()?))
    }
}

impl<P: MemoryProbe> AnalysisPipeline<P> {
    pub fn new(config: BenchConfig, probe: P) -> Self {
        Self {
            config,
            runner: BenchmarkRunner::new(probe),
        }
    }

    /// Run every stage on a fresh eager and a fresh deferred backend, writing
    /// the report to `out` as it goes.
    pub fn run<W: Write>(&self, out: &mut W) -> BenchResult<BenchReport> {
        let mut backends: Vec<Box<dyn Backend>> = vec![
            Box::new(EagerBackend::new()),
            Box::new(DeferredBackend::new(
                self.config.deferred.clone(),
                self.config.report.progress,
            )),
        ];
        self.run_on(&mut backends, out)
    }

    /// Run every stage on `backends`, in slice order. Column checks use the
    /// eager backend's dataset, or the first backend's if none is eager.
    pub fn run_on<W: Write>(
        &self,
        backends: &mut [Box<dyn Backend>],
        out: &mut W,
    ) -> BenchResult<BenchReport> {
        self.check_source()?;
        let source = &self.config.source;
        let analysis = &self.config.analysis;
        let mut report = BenchReport::default();

        writeln!(
            out,
            "Source: {} (encoding {:?}, bad lines: {:?})\n",
            source.path.display(),
            source.encoding,
            source.on_bad_lines
        )?;

        self.execute(Stage::Load, backends, &mut report, out, |b| b.load(source))?;

        if self.require(backends, &analysis.date_column, Stage::DeriveYear, &mut report, out)? {
            self.execute(Stage::DeriveYear, backends, &mut report, out, |b| {
                b.derive_year_column(&analysis.date_column, &analysis.year_column)
            })?;
        }

        if self.require(
            backends,
            &analysis.year_column,
            Stage::GroupCountByYear,
            &mut report,
            out,
        )? {
            self.execute(Stage::GroupCountByYear, backends, &mut report, out, |b| {
                b.group_count(&analysis.year_column)
            })?;
        }

        if self.require(
            backends,
            &analysis.frequency_column,
            Stage::TopNFrequency,
            &mut report,
            out,
        )? {
            self.execute(Stage::TopNFrequency, backends, &mut report, out, |b| {
                b.top_n_by_frequency(&analysis.frequency_column, analysis.top_n)
            })?;
        }

        if self.config.report.summary_table && !report.measurements.is_empty() {
            writeln!(out, "=== Comparison ===")?;
            write!(out, "{}", report::render_comparison(&report.measurements))?;
        }
        info!(
            "Run complete: {} measurement(s), {} note(s)",
            report.measurements.len(),
            report.notes.len()
        );
        Ok(report)
    }

    fn check_source(&self) -> BenchResult<()> {
        let path = &self.config.source.path;
        let unreadable = |source| BenchError::SourceUnreadable {
            path: path.clone(),
            source,
        };
        let meta = std::fs::metadata(path).map_err(unreadable)?;
        if !meta.is_file() {
            return Err(unreadable(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let columns = io::read_header(&self.config.source)?;
        debug!("Source has {} column(s)", columns.len());
        Ok(())
    }

    /// `true` when `column` exists in the reference dataset. Otherwise record
    /// one note covering both backends.
    fn require<W: Write>(
        &self,
        backends: &[Box<dyn Backend>],
        column: &str,
        stage: Stage,
        report: &mut BenchReport,
        out: &mut W,
    ) -> BenchResult<bool> {
        let reference = backends
            .iter()
            .find(|b| b.kind() == BackendKind::Eager)
            .or_else(|| backends.first());
        let present = reference
            .map(|b| b.columns().iter().any(|c| c == column))
            .unwrap_or(false);
        if present {
            return Ok(true);
        }

        let note = format!(
            "Column '{}' not found; skipping {} on both backends",
            column,
            stage.name()
        );
        warn!("{}", note);
        writeln!(out, "{}", report::render_note(&note))?;
        report.notes.push(note);
        Ok(false)
    }

    fn execute<T, F, W>(
        &self,
        stage: Stage,
        backends: &mut [Box<dyn Backend>],
        report: &mut BenchReport,
        out: &mut W,
        mut op: F,
    ) -> BenchResult<Vec<T>>
    where
        T: StageOutput,
        F: FnMut(&mut dyn Backend) -> BenchResult<T>,
        W: Write,
    {
        let label = stage.label(&self.config);
        let mut outputs = Vec::with_capacity(backends.len());

        for backend in backends.iter_mut() {
            let kind = backend.kind();
            let _span = info_span!("stage", stage = stage.name(), backend = %kind).entered();
            info!("Running {}", label);

            let (output, measurement) =
                self.runner
                    .measure(stage.name(), kind, || op(backend.as_mut()))?;
            let summary = output.summary(self.config.analysis.preview_rows);

            let mut text = report::render_header(&label, kind);
            text.push_str(&report::render_measurement(&measurement));
            if let Some(columns) = output.columns() {
                text.push_str(&report::render_columns(columns));
            }
            if let Some(summary) = &summary {
                text.push_str(&report::render_summary(summary));
            }
            writeln!(out, "{}", text)?;

            report.measurements.push(measurement);
            if let Some(summary) = summary {
                report.summaries.push(StageSummary {
                    stage,
                    backend: kind,
                    summary,
                });
            }
            outputs.push(output);
        }
        Ok(outputs)
    }
}
