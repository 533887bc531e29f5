//! Task and run results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::harness::HarnessType;
use crate::sandbox::JobResult;
use crate::scoring::ScoreResult;
use crate::trajectory::ExecutionMetrics;

/// Groups results by the harness/model pair that produced them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub harness: HarnessType,
    pub model: String,
}

impl ModelKey {
    pub fn new(harness: HarnessType, model: impl Into<String>) -> Self {
        Self {
            harness,
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.harness, self.model)
    }
}

/// Outcome of one (task, harness, model) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub harness: HarnessType,
    pub model: String,
    pub prompt: String,
    /// Container job outcome. `exit_code == -1` when no job ran.
    pub job: JobResult,
    /// Scorer name to result. Empty unless the job succeeded.
    #[serde(default)]
    pub scores: BTreeMap<String, ScoreResult>,
    /// Orchestration-level failure for this combination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Configured timeout.
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ExecutionMetrics>,
}

impl TaskResult {
    /// True when the job succeeded and nothing else failed.
    pub fn success(&self) -> bool {
        self.job.success() && self.error.is_none()
    }

    /// True when the task succeeded and every recorded scorer passed.
    pub fn overall_pass(&self) -> bool {
        self.success() && self.scores.values().all(|s| s.overall_pass)
    }

    pub fn model_key(&self) -> ModelKey {
        ModelKey::new(self.harness, self.model.clone())
    }

    /// Mean of the recorded scores, if any.
    pub fn mean_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.values().map(|s| s.score).sum::<f64>() / self.scores.len() as f64)
    }

    /// `PASS`, `FAIL` (ran but did not pass) or `ERROR` (did not run cleanly).
    pub fn status_label(&self) -> &'static str {
        if self.overall_pass() {
            "PASS"
        } else if self.success() {
            "FAIL"
        } else {
            "ERROR"
        }
    }
}

/// Counts for one harness/model pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub harness: HarnessType,
    pub model: String,
    pub total: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub mean_duration_seconds: f64,
}

/// Aggregate statistics of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    /// Tasks that passed every scorer.
    pub passed: usize,
    /// Tasks that ran cleanly but did not pass.
    pub failed: usize,
    /// Tasks whose build, job or orchestration failed.
    pub errored: usize,
    pub pass_rate: f64,
    pub mean_duration_seconds: f64,
    #[serde(default)]
    pub per_model: Vec<ModelSummary>,
}

impl RunSummary {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.overall_pass()).count();
        let errored = results.iter().filter(|r| !r.success()).count();

        let mut groups: BTreeMap<ModelKey, Vec<&TaskResult>> = BTreeMap::new();
        for result in results {
            groups.entry(result.model_key()).or_default().push(result);
        }
        let per_model = groups
            .into_iter()
            .map(|(key, group)| {
                let passed = group.iter().filter(|r| r.overall_pass()).count();
                ModelSummary {
                    harness: key.harness,
                    model: key.model,
                    total: group.len(),
                    passed,
                    pass_rate: percentage(passed, group.len()),
                    mean_duration_seconds: mean_duration(group.iter().copied()),
                }
            })
            .collect();

        Self {
            total,
            passed,
            failed: total - passed - errored,
            errored,
            pass_rate: percentage(passed, total),
            mean_duration_seconds: mean_duration(results.iter()),
            per_model,
        }
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

fn mean_duration<'a>(results: impl Iterator<Item = &'a TaskResult>) -> f64 {
    let (sum, count) = results.fold((0.0, 0usize), |(sum, count), r| {
        (sum + r.job.duration_seconds, count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Outcome of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    pub run_id: String,
    pub config_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// One entry per matrix combination, in completion order.
    #[serde(default)]
    pub task_results: Vec<TaskResult>,
    /// Run-level failure, e.g. missing credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Computed when the run is finalized.
    #[serde(default)]
    pub summary: RunSummary,
}

impl EvalResult {
    /// Starts a new run record.
    pub fn new(run_id: impl Into<String>, config_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            config_name: config_name.into(),
            started_at: Utc::now(),
            completed_at: None,
            task_results: Vec::new(),
            error: None,
            summary: RunSummary::default(),
        }
    }

    /// True when there is no run-level error and every task succeeded.
    pub fn success(&self) -> bool {
        self.error.is_none() && self.task_results.iter().all(TaskResult::success)
    }

    /// Percentage of tasks that passed; 0 when there are none.
    pub fn pass_rate(&self) -> f64 {
        let passed = self.task_results.iter().filter(|r| r.overall_pass()).count();
        percentage(passed, self.task_results.len())
    }

    /// True when every task passed and the run itself did not fail.
    pub fn all_passed(&self) -> bool {
        self.error.is_none() && self.task_results.iter().all(TaskResult::overall_pass)
    }

    /// Stamps completion time and computes the summary.
    pub fn finalize(&mut self) {
        self.completed_at = Some(Utc::now());
        self.summary = RunSummary::from_results(&self.task_results);
    }

    /// Wall-clock duration, once finalized.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}
