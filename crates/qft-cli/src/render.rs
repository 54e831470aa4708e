//! Output formatting for task projections.

use serde::Serialize;
use std::fmt::Write as _;

use qft_core::app::{IngestSummary, RegistryCounts, TaskView};

/// Everything printed for one registry.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub role: &'a str,
    pub tasks: &'a [TaskView],
    pub counts: &'a RegistryCounts,
    pub summary: &'a IngestSummary,
}

pub fn json(report: &Report<'_>) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn table(report: &Report<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {} task(s)", report.role, report.counts.total);
    let _ = writeln!(
        out,
        "{:<31}  {:<24}  {:>12}  {:>13}  {:>7}  {:<9}",
        "ID", "FILE", "SIZE", "BLOCKS", "PROG", "STATUS"
    );
    for task in report.tasks {
        let _ = writeln!(
            out,
            "{:<31}  {:<24}  {:>12}  {:>13}  {:>6.1}%  {:<9}",
            task.id.to_string(),
            truncate(&task.filename, 24),
            task.file_size,
            format!("{}/{}", task.completed_blocks, task.block_count),
            task.progress_percent,
            task.status,
        );
    }

    let by_status = report
        .counts
        .by_status
        .iter()
        .map(|(status, n)| format!("{status}={n}"))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(
        out,
        "finished {}/{} ({by_status}); snapshots processed={} rejected={} integrity_errors={}",
        report.counts.finished,
        report.counts.total,
        report.summary.processed,
        report.summary.rejected,
        report.summary.integrity_errors,
    );
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max.saturating_sub(1)).collect();
    cut.push('~');
    cut
}
