//! Benchmark runner: wraps one stage invocation with memory and time samples.

use crate::errors::BenchResult;
use crate::frequency::{FrequencyTable, ResultSummary};
use crate::observability::{MemoryProbe, Timer};
use std::fmt;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Eager,
    Deferred,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Eager => "eager",
            BackendKind::Deferred => "deferred",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape and materialization facts a stage result reports about itself.
pub trait StageOutput {
    fn row_count(&self) -> Option<usize> {
        None
    }

    fn column_count(&self) -> Option<usize> {
        None
    }

    /// `false` when the stage only described work that has not run yet.
    fn materialized(&self) -> bool {
        true
    }

    /// Column names worth echoing in the report.
    fn columns(&self) -> Option<&[String]> {
        None
    }

    fn summary(&self, _limit: usize) -> Option<ResultSummary> {
        None
    }
}

impl StageOutput for () {}

impl StageOutput for FrequencyTable {
    fn row_count(&self) -> Option<usize> {
        Some(self.len())
    }

    fn summary(&self, limit: usize) -> Option<ResultSummary> {
        Some(self.preview(limit))
    }
}

/// One timed and memory-sampled stage execution. Fields are read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    stage: String,
    backend: BackendKind,
    elapsed_seconds: f64,
    memory_delta_mb: f64,
    row_count: Option<usize>,
    column_count: Option<usize>,
    materialized: bool,
}

impl Measurement {
    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// Signed: freed memory shows up as a negative delta.
    pub fn memory_delta_mb(&self) -> f64 {
        self.memory_delta_mb
    }

    pub fn row_count(&self) -> Option<usize> {
        self.row_count
    }

    pub fn column_count(&self) -> Option<usize> {
        self.column_count
    }

    pub fn materialized(&self) -> bool {
        self.materialized
    }
}

pub struct BenchmarkRunner<P: MemoryProbe> {
    probe: P,
    timer: Timer,
}

impl<P: MemoryProbe> BenchmarkRunner<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            timer: Timer,
        }
    }

    /// Run `operation` once and measure it.
    ///
    /// A failing operation is not retried and produces no measurement; its
    /// error is returned as is.
    pub fn measure<T, F>(
        &self,
        stage: &str,
        backend: BackendKind,
        operation: F,
    ) -> BenchResult<(T, Measurement)>
    where
        T: StageOutput,
        F: FnOnce() -> BenchResult<T>,
    {
        let before = self.probe.sample()?;
        let handle = self.timer.start();

        let output = operation().map_err(|e| {
            error!(stage, backend = %backend, "Stage failed: {}", e);
            e
        })?;

        let elapsed_seconds = self.timer.stop(handle);
        let after = self.probe.sample()?;

        let measurement = Measurement {
            stage: stage.to_string(),
            backend,
            elapsed_seconds,
            memory_delta_mb: after - before,
            row_count: output.row_count(),
            column_count: output.column_count(),
            materialized: output.materialized(),
        };
        debug!(
            stage,
            backend = %backend,
            elapsed_seconds,
            memory_delta_mb = measurement.memory_delta_mb,
            "Stage measured"
        );
        Ok((output, measurement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BenchError;
    use std::cell::{Cell, RefCell};

    /// Replays a fixed list of samples.
    struct ScriptedProbe {
        samples: RefCell<Vec<f64>>,
    }

    impl ScriptedProbe {
        fn new(mut samples: Vec<f64>) -> Self {
            samples.reverse();
            Self {
                samples: RefCell::new(samples),
            }
        }

        fn remaining(&self) -> usize {
            self.samples.borrow().len()
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn sample(&self) -> BenchResult<f64> {
            self.samples
                .borrow_mut()
                .pop()
                .ok_or_else(|| BenchError::Probe("script exhausted".to_string()))
        }
    }

    struct Shaped;

    impl StageOutput for Shaped {
        fn row_count(&self) -> Option<usize> {
            Some(3)
        }

        fn column_count(&self) -> Option<usize> {
            Some(2)
        }

        fn materialized(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_measure_records_signed_delta() -> BenchResult<()> {
        let runner = BenchmarkRunner::new(ScriptedProbe::new(vec![100.0, 92.5]));
        let ((), m) = runner.measure("load", BackendKind::Eager, || Ok(()))?;
        assert_eq!(m.stage(), "load");
        assert_eq!(m.backend(), BackendKind::Eager);
        assert!((m.memory_delta_mb() - (-7.5)).abs() < f64::EPSILON);
        assert!(m.elapsed_seconds() >= 0.0);
        assert!(m.materialized());
        assert_eq!(m.row_count(), None);
        Ok(())
    }

    #[test]
    fn test_measure_takes_shape_from_output() -> BenchResult<()> {
        let runner = BenchmarkRunner::new(ScriptedProbe::new(vec![1.0, 2.0]));
        let (_, m) = runner.measure("derive_year", BackendKind::Deferred, || Ok(Shaped))?;
        assert_eq!(m.row_count(), Some(3));
        assert_eq!(m.column_count(), Some(2));
        assert!(!m.materialized());
        Ok(())
    }

    #[test]
    fn test_operation_runs_exactly_once() -> BenchResult<()> {
        let runner = BenchmarkRunner::new(ScriptedProbe::new(vec![0.0, 0.0]));
        let calls = Cell::new(0);
        runner.measure("load", BackendKind::Eager, || {
            calls.set(calls.get() + 1);
            Ok(())
        })?;
        assert_eq!(calls.get(), 1);
        Ok(())
    }

    #[test]
    fn test_failure_propagates_without_second_sample() {
        let probe = ScriptedProbe::new(vec![10.0, 20.0]);
        let runner = BenchmarkRunner::new(probe);
        let result: BenchResult<((), Measurement)> =
            runner.measure("load", BackendKind::Eager, || {
                Err(BenchError::InvalidConfig("boom".to_string()))
            });
        assert!(matches!(result, Err(BenchError::InvalidConfig(_))));
        // only the "before" sample was taken
        assert_eq!(runner.probe.remaining(), 1);
    }

    #[test]
    fn test_probe_failure_is_fatal() {
        let runner = BenchmarkRunner::new(ScriptedProbe::new(vec![]));
        let result = runner.measure("load", BackendKind::Eager, || Ok(()));
        assert!(matches!(result, Err(BenchError::Probe(_))));
    }
}
