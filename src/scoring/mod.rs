//! Scorers judge a finished job's artifacts.
//!
//! A scorer receives the task's artifacts directory, which holds at least
//! `workspace/` (the container's final working directory) and usually
//! `stdout.log`, `stderr.log`, `metadata.json` and `trajectory.jsonl`.
//!
//! Two scorers are built in:
//! - [`PatternScorer`]: deterministic file, output and trajectory checks
//! - [`RubricScorer`]: an LLM judge grading the workspace against criteria

pub mod pattern;
pub mod rubric;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::is_valid_path_name;
use crate::error::{ConfigError, ScorerError};

pub use pattern::{CheckKind, PatternCheck, PatternScorer, PatternScorerConfig};
pub use rubric::{RubricScorer, RubricScorerConfig};

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Unique identifier for this check.
    pub check_id: String,
    /// Type of check performed.
    pub check_type: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Whether this check is required for overall pass.
    pub required: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// What was observed, if useful for diagnosis.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub actual: String,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    /// Creates a passed check result.
    pub fn pass(check_id: impl Into<String>, check_type: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            check_type: check_type.into(),
            passed: true,
            required: true,
            description: String::new(),
            actual: String::new(),
            error: None,
        }
    }

    /// Creates a failed check result.
    pub fn fail(
        check_id: impl Into<String>,
        check_type: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
            ..Self::pass(check_id, check_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = actual.into();
        self
    }

    /// Sets whether this check is required.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// One scorer's verdict on one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Name of the scorer that produced this result.
    pub scorer: String,
    /// Whether the task passes this scorer.
    pub overall_pass: bool,
    /// Score in `[0, 1]`.
    pub score: f64,
    /// Per-check breakdown.
    #[serde(default)]
    pub checks: Vec<CheckResult>,
    /// One-line summary.
    #[serde(default)]
    pub summary: String,
    /// Set when the scorer itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreResult {
    /// Builds a result from checks: score is the passed fraction and the
    /// task passes when every required check passes.
    pub fn from_checks(scorer: impl Into<String>, checks: Vec<CheckResult>) -> Self {
        let passed = checks.iter().filter(|c| c.passed).count();
        let total = checks.len();
        let score = if total == 0 {
            1.0
        } else {
            passed as f64 / total as f64
        };
        let overall_pass = checks.iter().all(|c| c.passed || !c.required);

        Self {
            scorer: scorer.into(),
            overall_pass,
            score,
            summary: format!("{}/{} checks passed", passed, total),
            checks,
            error: None,
        }
    }

    /// A failed result recording why the scorer could not run.
    pub fn failed(scorer: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            scorer: scorer.into(),
            overall_pass: false,
            score: 0.0,
            checks: Vec::new(),
            summary: format!("scorer failed: {}", error),
            error: Some(error),
        }
    }

    /// A bare result, mostly for tests and custom scorers.
    pub fn new(scorer: impl Into<String>, overall_pass: bool, score: f64) -> Self {
        Self {
            scorer: scorer.into(),
            overall_pass,
            score,
            checks: Vec::new(),
            summary: String::new(),
            error: None,
        }
    }
}

/// Trait for scorers.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Name used as the key in `TaskResult.scores` and the score file name.
    fn name(&self) -> &str;

    /// Environment variables the scorer needs at run time.
    fn required_env_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Judges the artifacts of one finished job.
    async fn score(&self, artifacts_path: &Path) -> Result<ScoreResult, ScorerError>;
}

/// Scorer configuration as written in an evaluation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScorerConfig {
    Pattern(PatternScorerConfig),
    Rubric(RubricScorerConfig),
}

impl ScorerConfig {
    pub fn name(&self) -> String {
        match self {
            ScorerConfig::Pattern(c) => c.name.clone(),
            ScorerConfig::Rubric(c) => c.name.clone(),
        }
    }

    /// Checks the configuration without touching the filesystem or network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name();
        if !name.trim().is_empty() && !is_valid_path_name(&name) {
            return Err(ConfigError::InvalidValue {
                field: "scorers[].name".to_string(),
                reason: format!("'{}' may only contain [A-Za-z0-9._-]", name),
            });
        }
        match self {
            ScorerConfig::Pattern(c) => c.validate(),
            ScorerConfig::Rubric(c) => c.validate(),
        }
    }

    /// Credentials this scorer will read.
    pub fn required_env_keys(&self) -> BTreeSet<String> {
        match self {
            ScorerConfig::Pattern(_) => BTreeSet::new(),
            ScorerConfig::Rubric(c) => BTreeSet::from([c.api_key_env.clone()]),
        }
    }
}

/// Creates the scorer for a configuration.
pub fn create_scorer(config: &ScorerConfig) -> Result<Arc<dyn Scorer>, ScorerError> {
    Ok(match config {
        ScorerConfig::Pattern(c) => Arc::new(PatternScorer::new(c.clone())?),
        ScorerConfig::Rubric(c) => Arc::new(RubricScorer::new(c.clone())),
    })
}
