//! Year extraction from free-form publication dates
//!
//! Dates in the wild come as full ISO dates, US-style dates, "2020 Mar 1",
//! or just a year. [`parse_year`] accepts a fixed set of layouts and returns
//! `None` for everything else, so a bad value turns into a null year instead
//! of failing the column. The same function backs both backends.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use regex::Regex;
use std::sync::LazyLock;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%Y %b %d",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

// "2020", "2020-03", "2020/3", "2020 Mar", "2020 March"
static PARTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(?:[-/ ]([0-9]{1,2}|[A-Za-z]{3,9}))?$")
        .expect("partial date pattern is valid")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub fn parse_year(value: &str) -> Option<i32> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(caps) = PARTIAL_RE.captures(value) {
        let year: i32 = caps[1].parse().ok()?;
        return match caps.get(2) {
            None => Some(year),
            Some(month) if valid_month(month.as_str()) => Some(year),
            // "2020-13", "2020 Smarch"
            Some(_) => None,
        };
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date.year());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts.year());
        }
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.year())
}

fn valid_month(token: &str) -> bool {
    if let Ok(n) = token.parse::<u32>() {
        return (1..=12).contains(&n);
    }
    let lower = token.to_ascii_lowercase();
    lower.len() >= 3
        && MONTHS.iter().enumerate().any(|(i, abbr)| {
            lower.starts_with(abbr) && full_month_prefix(i).starts_with(lower.as_str())
        })
}

fn full_month_prefix(index: usize) -> &'static str {
    [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ][index]
}

/// Map every value of `series` to its year, as an `Int32` column of the same length.
///
/// Non-string columns are cast to strings first; nulls stay null.
pub fn years_of(series: &Series) -> PolarsResult<Int32Chunked> {
    let strings = series.cast(&DataType::String)?;
    let years: Int32Chunked = strings
        .str()?
        .iter()
        .map(|v| v.and_then(parse_year))
        .collect();
    Ok(years.with_name(series.name().clone()))
}
