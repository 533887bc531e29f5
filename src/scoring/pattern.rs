//! Deterministic checks over workspace files, stdout and the trajectory.
//!
//! ```yaml
//! - type: pattern
//!   name: report
//!   checks:
//!     - kind: file_exists
//!       path: summary.md
//!     - kind: file_matches
//!       path: summary.md
//!       pattern: "(?i)total revenue"
//!     - kind: trajectory_matches
//!       pattern: "skills/pdf/SKILL\\.md"
//!       required: false
//! ```

use std::path::{Component, Path};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CheckResult, ScoreResult, Scorer};
use crate::error::{ConfigError, ScorerError};
use crate::harness::TRAJECTORY_FILE;

/// What a check looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    /// A workspace file exists.
    FileExists { path: String },
    /// A workspace file does not exist.
    FileAbsent { path: String },
    /// A workspace file's content matches a regex.
    FileMatches { path: String, pattern: String },
    /// The harness's stdout matches a regex.
    StdoutMatches { pattern: String },
    /// Any trajectory line matches a regex.
    TrajectoryMatches { pattern: String },
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::FileExists { .. } => "file_exists",
            CheckKind::FileAbsent { .. } => "file_absent",
            CheckKind::FileMatches { .. } => "file_matches",
            CheckKind::StdoutMatches { .. } => "stdout_matches",
            CheckKind::TrajectoryMatches { .. } => "trajectory_matches",
        }
    }

    fn path(&self) -> Option<&str> {
        match self {
            CheckKind::FileExists { path }
            | CheckKind::FileAbsent { path }
            | CheckKind::FileMatches { path, .. } => Some(path),
            _ => None,
        }
    }

    fn pattern(&self) -> Option<&str> {
        match self {
            CheckKind::FileMatches { pattern, .. }
            | CheckKind::StdoutMatches { pattern }
            | CheckKind::TrajectoryMatches { pattern } => Some(pattern),
            _ => None,
        }
    }
}

fn default_required() -> bool {
    true
}

/// One configured check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCheck {
    /// Check identifier; defaults to `check-<n>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Whether a failure fails the scorer.
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: CheckKind,
}

impl PatternCheck {
    pub fn new(kind: CheckKind) -> Self {
        Self {
            id: None,
            required: true,
            description: None,
            kind,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Configuration of a [`PatternScorer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternScorerConfig {
    pub name: String,
    #[serde(default)]
    pub checks: Vec<PatternCheck>,
}

impl PatternScorerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: PatternCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("scorers[].name".to_string()));
        }
        for check in &self.checks {
            if let Some(path) = check.kind.path() {
                if !is_workspace_relative(path) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("scorer '{}' path", self.name),
                        reason: format!("'{}' must be a relative path inside the workspace", path),
                    });
                }
            }
            if let Some(pattern) = check.kind.pattern() {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    scorer: self.name.clone(),
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}

fn is_workspace_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

struct CompiledCheck {
    id: String,
    spec: PatternCheck,
    regex: Option<Regex>,
}

/// Scorer running [`PatternCheck`]s.
pub struct PatternScorer {
    name: String,
    checks: Vec<CompiledCheck>,
}

impl PatternScorer {
    /// Compiles the configured checks.
    pub fn new(config: PatternScorerConfig) -> Result<Self, ScorerError> {
        let mut checks = Vec::with_capacity(config.checks.len());
        for (idx, spec) in config.checks.into_iter().enumerate() {
            let regex = spec
                .kind
                .pattern()
                .map(Regex::new)
                .transpose()
                .map_err(|e| ScorerError::Config(e.to_string()))?;
            let id = spec
                .id
                .clone()
                .unwrap_or_else(|| format!("check-{}", idx + 1));
            checks.push(CompiledCheck { id, spec, regex });
        }
        Ok(Self {
            name: config.name,
            checks,
        })
    }

    async fn run_check(&self, check: &CompiledCheck, artifacts: &Artifacts) -> CheckResult {
        let kind = check.spec.kind.as_str();
        let result = match (&check.spec.kind, &check.regex) {
            (CheckKind::FileExists { path }, _) => {
                if artifacts.workspace.join(path).exists() {
                    CheckResult::pass(&check.id, kind)
                } else {
                    CheckResult::fail(&check.id, kind, format!("File not found: {}", path))
                }
            }
            (CheckKind::FileAbsent { path }, _) => {
                if artifacts.workspace.join(path).exists() {
                    CheckResult::fail(&check.id, kind, format!("File should not exist: {}", path))
                } else {
                    CheckResult::pass(&check.id, kind)
                }
            }
            (CheckKind::FileMatches { path, pattern }, Some(regex)) => {
                match tokio::fs::read_to_string(artifacts.workspace.join(path)).await {
                    Ok(content) if regex.is_match(&content) => CheckResult::pass(&check.id, kind),
                    Ok(_) => CheckResult::fail(
                        &check.id,
                        kind,
                        format!("Pattern '{}' not found in {}", pattern, path),
                    ),
                    Err(e) => {
                        CheckResult::fail(&check.id, kind, format!("Failed to read {}: {}", path, e))
                    }
                }
            }
            (CheckKind::StdoutMatches { pattern }, Some(regex)) => {
                if regex.is_match(&artifacts.stdout) {
                    CheckResult::pass(&check.id, kind)
                } else {
                    CheckResult::fail(&check.id, kind, format!("Pattern '{}' not found in stdout", pattern))
                }
            }
            (CheckKind::TrajectoryMatches { pattern }, Some(regex)) => {
                match artifacts.trajectory.lines().find(|line| regex.is_match(line)) {
                    Some(line) => CheckResult::pass(&check.id, kind).with_actual(truncate(line, 200)),
                    None => CheckResult::fail(
                        &check.id,
                        kind,
                        format!("No trajectory event matches '{}'", pattern),
                    ),
                }
            }
            // Regex-based kinds always carry a compiled regex.
            (_, None) => CheckResult::fail(&check.id, kind, "Pattern was not compiled"),
        };

        debug!(
            scorer = %self.name,
            check = %check.id,
            passed = result.passed,
            "Pattern check finished"
        );

        result
            .with_required(check.spec.required)
            .with_description(check.spec.description.clone().unwrap_or_default())
    }
}

/// Text sources a scorer reads once per task.
struct Artifacts {
    workspace: std::path::PathBuf,
    stdout: String,
    trajectory: String,
}

impl Artifacts {
    async fn load(artifacts_path: &Path) -> Self {
        let stdout = tokio::fs::read_to_string(artifacts_path.join("stdout.log"))
            .await
            .unwrap_or_default();
        // Built-in harnesses stream their events on stdout instead.
        let trajectory = match tokio::fs::read_to_string(artifacts_path.join(TRAJECTORY_FILE)).await {
            Ok(content) if !content.trim().is_empty() => content,
            _ => stdout.clone(),
        };
        Self {
            workspace: artifacts_path.join("workspace"),
            stdout,
            trajectory,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

#[async_trait]
impl Scorer for PatternScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, artifacts_path: &Path) -> Result<ScoreResult, ScorerError> {
        let artifacts = Artifacts::load(artifacts_path).await;
        let mut checks = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            checks.push(self.run_check(check, &artifacts).await);
        }
        Ok(ScoreResult::from_checks(&self.name, checks))
    }
}
