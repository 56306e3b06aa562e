//! Benchmark configuration
//!
//! Everything the comparison run needs is carried by one [`BenchConfig`]:
//! the source file and how to decode it, how the deferred backend partitions
//! it, which columns the analysis stages use, and how the report is printed.
//! Every field has a default, so an empty YAML document is a valid config.

use crate::errors::{BenchError, BenchResult};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

/// Largest preview the report will ever print.
pub const MAX_PREVIEW_ROWS: usize = 10;

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub source: SourceConfig,
    pub deferred: DeferredConfig,
    pub analysis: AnalysisConfig,
    pub report: ReportConfig,
}

/// Where the CSV lives and how it is decoded.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub encoding: Encoding,
    pub on_bad_lines: BadLinePolicy,
    /// Columns forced to `String` in the deferred backend's partition scans.
    pub string_columns: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metadata.csv"),
            encoding: Encoding::Latin1,
            on_bad_lines: BadLinePolicy::Warn,
            string_columns: vec![
                "arxiv_id".to_string(),
                "who_covidence_id".to_string(),
                "pubmed_id".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Strict UTF-8; invalid bytes abort the run.
    #[serde(alias = "utf-8")]
    Utf8,
    /// Single-byte Latin-1: every byte maps to the code point of the same value.
    #[serde(alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    LossyUtf8,
}

/// What to do with a row carrying more fields than the header.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BadLinePolicy {
    Error,
    Warn,
    Skip,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeferredConfig {
    pub partition_size: ByteSize,
    /// Rows used to infer each partition's schema; `None` scans the whole partition.
    pub infer_schema_rows: Option<usize>,
    /// Run forced graphs on the streaming engine.
    pub streaming: bool,
    pub staging_dir: Option<PathBuf>,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            partition_size: ByteSize(64_000_000),
            infer_schema_rows: None,
            streaming: false,
            staging_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub date_column: String,
    pub year_column: String,
    pub frequency_column: String,
    pub top_n: usize,
    pub preview_rows: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            date_column: "publish_time".to_string(),
            year_column: "publish_year".to_string(),
            frequency_column: "journal".to_string(),
            top_n: 10,
            preview_rows: MAX_PREVIEW_ROWS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Spinner on stderr while a deferred graph is forced.
    pub progress: bool,
    /// Final eager/deferred comparison table.
    pub summary_table: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            progress: true,
            summary_table: true,
        }
    }
}

impl BenchConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> BenchResult<Self> {
        // An empty document deserializes to unit, not to an empty mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: BenchConfig =
            serde_yaml::from_str(content).map_err(|e| BenchError::ConfigError(e, None))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.analysis.top_n == 0 {
            return Err(BenchError::InvalidConfig(
                "analysis.top_n must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_PREVIEW_ROWS).contains(&self.analysis.preview_rows) {
            return Err(BenchError::InvalidConfig(format!(
                "analysis.preview_rows must be between 1 and {}, got {}",
                MAX_PREVIEW_ROWS, self.analysis.preview_rows
            )));
        }
        if self.deferred.partition_size.0 == 0 {
            return Err(BenchError::InvalidConfig(
                "deferred.partition_size must be greater than zero".to_string(),
            ));
        }
        if self.deferred.infer_schema_rows == Some(0) {
            return Err(BenchError::InvalidConfig(
                "deferred.infer_schema_rows must be at least 1".to_string(),
            ));
        }
        let named = [
            ("analysis.date_column", &self.analysis.date_column),
            ("analysis.year_column", &self.analysis.year_column),
            ("analysis.frequency_column", &self.analysis.frequency_column),
        ];
        for (key, value) in named {
            if value.trim().is_empty() {
                return Err(BenchError::InvalidConfig(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }
}

/// A byte count that also accepts human sizes such as `64MB` or `512KiB`.
///
/// Decimal units (`KB`, `MB`, `GB`) are powers of 1000, binary units (`KiB`,
/// `MiB`, `GiB`) powers of 1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(b|kb|mb|gb|tb|kib|mib|gib|tib)?\s*$")
        .expect("size pattern is valid")
});

impl FromStr for ByteSize {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = SIZE_RE
            .captures(s)
            .ok_or_else(|| BenchError::InvalidConfig(format!("invalid size: {:?}", s)))?;
        let amount: f64 = caps[1]
            .parse()
            .map_err(|_| BenchError::InvalidConfig(format!("invalid size: {:?}", s)))?;
        let unit = caps
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let factor: u64 = match unit.as_str() {
            "" | "b" => 1,
            "kb" => 1_000,
            "mb" => 1_000_000,
            "gb" => 1_000_000_000,
            "tb" => 1_000_000_000_000,
            "kib" => 1 << 10,
            "mib" => 1 << 20,
            "gib" => 1 << 30,
            "tib" => 1 << 40,
            other => {
                return Err(BenchError::InvalidConfig(format!("unknown size unit: {}", other)))
            }
        };
        Ok(ByteSize((amount * factor as f64).round() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(n) => Ok(ByteSize(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_metadata_layout() {
        let config = BenchConfig::default();
        assert_eq!(config.source.path, PathBuf::from("metadata.csv"));
        assert_eq!(config.source.encoding, Encoding::Latin1);
        assert_eq!(config.source.on_bad_lines, BadLinePolicy::Warn);
        assert_eq!(
            config.source.string_columns,
            vec!["arxiv_id", "who_covidence_id", "pubmed_id"]
        );
        assert_eq!(config.analysis.frequency_column, "journal");
        assert_eq!(config.analysis.top_n, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = BenchConfig::from_yaml("").unwrap();
        assert_eq!(config, BenchConfig::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let yaml = r#"
source:
  path: "/data/metadata.csv"
  encoding: utf-8
  on_bad_lines: skip
deferred:
  partition_size: 16MiB
analysis:
  top_n: 5
"#;
        let config = BenchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.source.path, PathBuf::from("/data/metadata.csv"));
        assert_eq!(config.source.encoding, Encoding::Utf8);
        assert_eq!(config.source.on_bad_lines, BadLinePolicy::Skip);
        // untouched fields keep their defaults
        assert_eq!(config.source.string_columns.len(), 3);
        assert_eq!(config.deferred.partition_size, ByteSize(16 * 1024 * 1024));
        assert_eq!(config.deferred.infer_schema_rows, None);
        assert_eq!(config.analysis.top_n, 5);
        assert_eq!(config.analysis.date_column, "publish_time");
    }

    #[test]
    fn test_infer_schema_window() {
        let config = BenchConfig::from_yaml("deferred:\n  infer_schema_rows: 500\n").unwrap();
        assert_eq!(config.deferred.infer_schema_rows, Some(500));

        let err = BenchConfig::from_yaml("deferred:\n  infer_schema_rows: 0\n").unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }

    #[test]
    fn test_partition_size_as_integer() {
        let yaml = "deferred:\n  partition_size: 4096\n";
        let config = BenchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.deferred.partition_size, ByteSize(4096));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "source:\n  pathh: x.csv\n";
        let err = BenchConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BenchError::ConfigError(_, _)));
    }

    #[test]
    fn test_validate_rejects_zero_top_n() {
        let yaml = "analysis:\n  top_n: 0\n";
        let err = BenchConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_large_preview() {
        let mut config = BenchConfig::default();
        config.analysis.preview_rows = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_byte_size_units() {
        assert_eq!("64MB".parse::<ByteSize>().unwrap(), ByteSize(64_000_000));
        assert_eq!("1kib".parse::<ByteSize>().unwrap(), ByteSize(1024));
        assert_eq!("1.5 GB".parse::<ByteSize>().unwrap(), ByteSize(1_500_000_000));
        assert_eq!("100".parse::<ByteSize>().unwrap(), ByteSize(100));
        assert!("lots".parse::<ByteSize>().is_err());
        assert!("10 parsecs".parse::<ByteSize>().is_err());
    }
}
