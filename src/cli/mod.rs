//! Terminal presentation: the interactive dashboard and the plain-text
//! renderings shared by the non-interactive commands.
#![allow(missing_docs)]

pub mod dashboard;
pub mod input;
pub mod terminal_guard;

use colored::{ColoredString, Colorize};

use crate::queue::controller::BulkReport;
use crate::queue::job::{JobRecord, filterable_attributes};

/// The header row followed by one fixed-width line per job.
#[must_use]
pub fn job_table(jobs: &[JobRecord]) -> String {
    let mut out = String::new();
    out.push_str(&JobRecord::header().display_row().bold().to_string());
    out.push('\n');
    for job in jobs {
        out.push_str(&paint_state(&job.state, job.display_row()).to_string());
        out.push('\n');
    }
    out
}

/// Display name → key listing for `squid attributes`.
#[must_use]
pub fn attribute_table() -> String {
    filterable_attributes()
        .iter()
        .map(|(name, field)| format!("{name:<16}{}\n", field.key()))
        .collect()
}

/// Human summary of a bulk or multi-id mutation.
#[must_use]
pub fn bulk_summary(report: &BulkReport) -> String {
    let mut out = if report.is_success() {
        report.summary().green().to_string()
    } else {
        report.summary().red().to_string()
    };
    if report.skipped > 0 {
        out.push_str(&format!(" ({} row(s) without a job id skipped)", report.skipped));
    }
    for failure in &report.failures {
        out.push_str(&format!("\n  {}: {}", failure.job_id, failure.error));
    }
    out
}

fn paint_state(state: &str, text: String) -> ColoredString {
    match state {
        "RUNNING" | "R" => text.green(),
        "PENDING" | "PD" => text.yellow(),
        "FAILED" | "F" | "TIMEOUT" | "TO" | "NODE_FAIL" | "NF" => text.red(),
        _ => text.normal(),
    }
}
