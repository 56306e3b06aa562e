use miette::{Diagnostic, SourceSpan};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code("DUALBENCH-001"),
        help("Please check your benchmark YAML syntax and structure.")
    )]
    ConfigError(#[source] serde_yaml::Error, #[label("here")] Option<SourceSpan>),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code("DUALBENCH-002"),
        help("Adjust the offending value in the config file or on the command line.")
    )]
    InvalidConfig(String),

    #[error("Cannot read source file {path:?}: {source}")]
    #[diagnostic(
        code("DUALBENCH-003"),
        help("Check the CSV path and its permissions. No stage was executed.")
    )]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed row at line {line}: expected {expected} fields, found {found}")]
    #[diagnostic(
        code("DUALBENCH-004"),
        help("Use `on_bad_lines: warn` or `skip` to drop malformed rows instead of aborting.")
    )]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Invalid UTF-8 at line {line}")]
    #[diagnostic(
        code("DUALBENCH-005"),
        help("Declare the real encoding of the file, e.g. `encoding: latin1` or `lossy_utf8`.")
    )]
    Encoding { line: u64 },

    #[error("CSV error: {0}")]
    #[diagnostic(code("DUALBENCH-006"), help("The source could not be tokenized as CSV."))]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code("DUALBENCH-007"),
        help("Check file paths and permissions.")
    )]
    IoError(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    #[diagnostic(
        code("DUALBENCH-008"),
        help("An error occurred within the data processing engine.")
    )]
    PolarsError(#[from] polars::error::PolarsError),

    #[error("Memory probe unavailable: {0}")]
    #[diagnostic(
        code("DUALBENCH-009"),
        help("Resident memory could not be read for this process; the benchmark cannot run here.")
    )]
    Probe(String),

    #[error(transparent)]
    #[diagnostic(code("DUALBENCH-000"))]
    Unknown(#[from] anyhow::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;
