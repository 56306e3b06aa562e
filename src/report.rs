//! Plain-text rendering of measurements and result previews.
//!
//! Every function here is pure: it returns the text and leaves printing to
//! the caller.

use crate::frequency::ResultSummary;
use crate::runner::{BackendKind, Measurement};
use std::fmt::{self, Write};

pub fn render_header(stage_label: &str, backend: BackendKind) -> String {
    format!("=== {} ({}) ===\n", stage_label, backend)
}

pub fn render_measurement(m: &Measurement) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_measurement(&mut out, m);
    out
}

fn write_measurement(out: &mut String, m: &Measurement) -> fmt::Result {
    writeln!(out, "Time (s): {:.4}", m.elapsed_seconds())?;
    writeln!(out, "Memory delta (MB): {:.2}", m.memory_delta_mb())?;
    match (m.row_count(), m.column_count()) {
        (Some(rows), Some(cols)) => writeln!(out, "Rows, columns: ({}, {})", rows, cols)?,
        (None, Some(cols)) => writeln!(out, "Rows, columns: (?, {})", cols)?,
        (Some(rows), None) => writeln!(out, "Result rows: {}", rows)?,
        (None, None) => {}
    }
    if !m.materialized() {
        writeln!(out, "Materialized: no (graph built, not executed)")?;
    }
    Ok(())
}

pub fn render_columns(columns: &[String]) -> String {
    format!("Columns: [{}]\n", columns.join(", "))
}

pub fn render_summary(summary: &ResultSummary) -> String {
    let mut out = String::new();
    let _ = write_summary(&mut out, summary);
    out
}

fn write_summary(out: &mut String, summary: &ResultSummary) -> fmt::Result {
    writeln!(out, "First values ({}):", summary.title)?;
    if summary.rows.is_empty() {
        return writeln!(out, "  (empty)");
    }
    let width = summary
        .rows
        .iter()
        .map(|(k, _)| k.chars().count())
        .max()
        .unwrap_or(0);
    for (key, value) in &summary.rows {
        writeln!(out, "  {:<width$}  {}", key, value, width = width)?;
    }
    Ok(())
}

pub fn render_note(note: &str) -> String {
    format!("[NOTE] {}\n", note)
}

/// Side-by-side eager/deferred table, one line per stage in first-seen order.
pub fn render_comparison(measurements: &[Measurement]) -> String {
    let mut out = String::new();
    let _ = write_comparison(&mut out, measurements);
    out
}

fn write_comparison(out: &mut String, measurements: &[Measurement]) -> fmt::Result {
    let mut stages: Vec<&str> = Vec::new();
    for m in measurements {
        if !stages.contains(&m.stage()) {
            stages.push(m.stage());
        }
    }

    let find = |stage: &str, backend: BackendKind| {
        measurements
            .iter()
            .find(|m| m.stage() == stage && m.backend() == backend)
    };
    let secs = |m: Option<&Measurement>| {
        m.map(|m| {
            let mark = if m.materialized() { "" } else { "*" };
            format!("{:.4}{}", m.elapsed_seconds(), mark)
        })
        .unwrap_or_else(|| "-".to_string())
    };
    let mb = |m: Option<&Measurement>| {
        m.map(|m| format!("{:.2}", m.memory_delta_mb()))
            .unwrap_or_else(|| "-".to_string())
    };

    writeln!(
        out,
        "{:<20} {:>12} {:>14} {:>12} {:>14}",
        "stage", "eager (s)", "deferred (s)", "eager (MB)", "deferred (MB)"
    )?;
    for stage in stages.iter().copied() {
        let eager = find(stage, BackendKind::Eager);
        let deferred = find(stage, BackendKind::Deferred);
        writeln!(
            out,
            "{:<20} {:>12} {:>14} {:>12} {:>14}",
            stage,
            secs(eager),
            secs(deferred),
            mb(eager),
            mb(deferred)
        )?;
    }
    if measurements.iter().any(|m| !m.materialized()) {
        writeln!(out, "* graph construction only, no data rows were read")?;
    }
    Ok(())
}
