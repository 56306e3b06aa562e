//! Eager vs deferred tabular analytics benchmark.
//!
//! The same four analysis stages run against an in-memory polars
//! `DataFrame` and against a partitioned `LazyFrame`; every stage is timed and
//! its resident-memory delta recorded, and the results are printed side by
//! side.

pub mod config;
pub mod dates;
pub mod engine;
pub mod errors;
pub mod frequency;
pub mod io;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod runner;

pub use config::BenchConfig;
pub use engine::{Backend, DeferredBackend, EagerBackend};
pub use errors::{BenchError, BenchResult};
pub use pipeline::{AnalysisPipeline, BenchReport, Stage};
pub use runner::{BackendKind, Measurement};
