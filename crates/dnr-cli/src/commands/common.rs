//! Shared utilities for CLI commands

use dnr_db::DbError;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;

/// Longest error text shown in per-item summaries
pub(crate) const SUMMARY_ERROR_LEN: usize = 120;

/// Exit code for failed stages and rejected input
pub(crate) const EXIT_FAILURE: i32 = 1;

/// Exit code for warehouse errors
pub(crate) const EXIT_DATABASE: i32 = 4;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and the connection pool is closed.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main maps it to the process exit status
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Exit code for an error that escaped a command: database errors anywhere
/// in the chain map to 4, everything else to 1
pub(crate) fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(code) = err.downcast_ref::<ExitCode>() {
        return code.0;
    }
    if err.chain().any(|e| e.downcast_ref::<DbError>().is_some()) {
        EXIT_DATABASE
    } else {
        EXIT_FAILURE
    }
}

/// Outcome of one stage, as recorded in run state and `meta.pipeline_run`
#[derive(Debug, Clone, Default)]
pub(crate) struct StageOutcome {
    pub summary: String,
    /// Items (files, sources, views) that failed within the stage
    pub failures: usize,
    /// Exit code to use when the stage counts as failed
    pub exit_code: i32,
}

impl StageOutcome {
    pub(crate) fn ok(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            failures: 0,
            exit_code: EXIT_FAILURE,
        }
    }

    pub(crate) fn succeeded(&self) -> bool {
        self.failures == 0
    }

    /// Turn a failed outcome into the process exit
    pub(crate) fn into_result(self) -> anyhow::Result<()> {
        if self.succeeded() {
            Ok(())
        } else {
            Err(ExitCode(self.exit_code).into())
        }
    }
}

/// Progress bar in the style used across commands
pub(crate) fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Calculate column widths for a table given headers and row data.
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

/// Print a formatted table to stdout.
///
/// Prints a left-aligned header row, a separator line of dashes, and each
/// data row. Columns are separated by two spaces.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  ").trim_end());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}

/// Seconds with two decimals, as shown in per-item lines
pub(crate) fn secs(duration_secs: f64) -> String {
    format!("{duration_secs:.2}s")
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
