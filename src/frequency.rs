//! Frequency tables shared by the group-count and top-n stages.

use crate::config::MAX_PREVIEW_ROWS;
use polars::prelude::*;

/// Name of the count column in grouped frames.
pub const COUNT_COLUMN: &str = "count";

/// Rendered in previews for the null group.
pub const NULL_KEY: &str = "<null>";

/// `(value, count)` pairs for one column. Values are stringified; `None` is the null group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrequencyTable {
    column: String,
    entries: Vec<(Option<String>, u64)>,
}

impl FrequencyTable {
    pub fn new(column: impl Into<String>, entries: Vec<(Option<String>, u64)>) -> Self {
        Self {
            column: column.into(),
            entries,
        }
    }

    /// Read a `[key, count]` frame as produced by a grouped query, keeping its row order.
    pub fn from_frame(df: &DataFrame, key: &str) -> PolarsResult<Self> {
        let keys = df
            .column(key)?
            .as_materialized_series()
            .cast(&DataType::String)?;
        let counts = df
            .column(COUNT_COLUMN)?
            .as_materialized_series()
            .cast(&DataType::UInt64)?;

        let entries = keys
            .str()?
            .iter()
            .zip(counts.u64()?.iter())
            .map(|(k, c)| (k.map(str::to_string), c.unwrap_or(0)))
            .collect();
        Ok(Self::new(key, entries))
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn entries(&self) -> &[(Option<String>, u64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn count_of(&self, key: Option<&str>) -> Option<u64> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_deref() == key)
            .map(|(_, c)| *c)
    }

    /// Entries sorted by key with the null group last, for order-insensitive comparison.
    pub fn sorted_entries(&self) -> Vec<(Option<String>, u64)> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| match (&a.0, &b.0) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        entries
    }

    pub fn preview(&self, limit: usize) -> ResultSummary {
        let rows = self
            .entries
            .iter()
            .take(limit.min(MAX_PREVIEW_ROWS))
            .map(|(k, c)| (k.clone().unwrap_or_else(|| NULL_KEY.to_string()), c.to_string()))
            .collect();
        ResultSummary {
            title: self.column.clone(),
            rows,
        }
    }
}

/// Bounded `(key, value)` preview of a stage result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSummary {
    pub title: String,
    pub rows: Vec<(String, String)>,
}
