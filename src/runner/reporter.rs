//! Streaming result reporting.
//!
//! The executor hands each harness/model batch to a [`ResultReporter`] as
//! soon as the last combination for that pair finishes, then reports the
//! whole run once at the end.

use std::sync::Arc;

use async_trait::async_trait;

use super::progress::ProgressLog;
use super::result::{EvalResult, ModelKey, RunSummary, TaskResult};

/// Receives results as the run progresses.
#[async_trait]
pub trait ResultReporter: Send + Sync {
    /// Called exactly once per harness/model pair, after its last task.
    async fn report_model(&self, key: &ModelKey, batch: &[TaskResult]);

    /// Called once with the finalized run.
    async fn report_run(&self, _result: &EvalResult) {}
}

/// Prints per-model tables and the run summary.
pub struct ConsoleReporter {
    log: Arc<ProgressLog>,
}

impl ConsoleReporter {
    pub fn new(log: Arc<ProgressLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ResultReporter for ConsoleReporter {
    async fn report_model(&self, key: &ModelKey, batch: &[TaskResult]) {
        self.log.block(&model_table(key, batch));
    }

    async fn report_run(&self, result: &EvalResult) {
        self.log.block(&run_summary_lines(result));
    }
}

/// Renders one model's batch as a table.
pub fn model_table(key: &ModelKey, batch: &[TaskResult]) -> Vec<String> {
    let mut sorted: Vec<&TaskResult> = batch.iter().collect();
    sorted.sort_by(|a, b| a.task_id.cmp(&b.task_id));

    let width = sorted
        .iter()
        .map(|r| r.task_id.len())
        .max()
        .unwrap_or(4)
        .max(4);
    let passed = batch.iter().filter(|r| r.overall_pass()).count();

    let mut lines = vec![
        String::new(),
        format!("== {} ({}/{} passed) ==", key, passed, batch.len()),
        format!("{:<width$}  {:<6}  {:>8}  {:>6}  {}", "TASK", "STATUS", "DURATION", "SCORE", "DETAIL"),
    ];
    for result in sorted {
        let score = result
            .mean_score()
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".to_string());
        let detail = result
            .error
            .as_deref()
            .or(result.job.error.as_deref())
            .map(first_line)
            .unwrap_or_default();
        lines.push(format!(
            "{:<width$}  {:<6}  {:>7.1}s  {:>6}  {}",
            result.task_id,
            result.status_label(),
            result.job.duration_seconds,
            score,
            detail,
        ));
    }
    lines
}

/// Renders the final run summary.
pub fn run_summary_lines(result: &EvalResult) -> Vec<String> {
    let mut lines = vec![String::new(), format!("Run {} ({})", result.run_id, result.config_name)];

    if let Some(error) = &result.error {
        lines.push(format!("  Run failed: {}", error));
        return lines;
    }

    let summary: &RunSummary = &result.summary;
    lines.push(format!(
        "  {} tasks: {} passed, {} failed, {} errored",
        summary.total, summary.passed, summary.failed, summary.errored
    ));
    lines.push(format!("  Pass rate: {:.1}%", summary.pass_rate));
    lines.push(format!("  Mean duration: {:.1}s", summary.mean_duration_seconds));
    if let Some(duration) = result.duration_seconds() {
        lines.push(format!("  Wall clock: {:.1}s", duration));
    }
    for model in &summary.per_model {
        lines.push(format!(
            "  {}:{}  {}/{} ({:.1}%)",
            model.harness, model.model, model.passed, model.total, model.pass_rate
        ));
    }
    lines
}

fn first_line(s: &str) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(77).collect::<String>())
    } else {
        line.to_string()
    }
}
