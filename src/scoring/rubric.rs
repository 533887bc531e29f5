//! LLM-judged rubric scoring.
//!
//! The judge sees the task prompt, a bounded snapshot of the workspace's
//! text files and, optionally, the tail of the trajectory. It answers with
//! a JSON verdict per criterion. The score is the fraction of criteria met
//! and the task passes when the score reaches `pass_threshold`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{CheckResult, ScoreResult, Scorer};
use crate::error::{ConfigError, ScorerError};
use crate::harness::TRAJECTORY_FILE;
use crate::llm::{ChatClient, GenerationRequest, LlmProvider, Message, DEFAULT_API_KEY_ENV};
use crate::storage::METADATA_FILE;

/// Default judge model.
pub const DEFAULT_JUDGE_MODEL: &str = "anthropic/claude-sonnet-4.5";

/// Files larger than this are listed but not inlined.
const MAX_FILE_BYTES: u64 = 64 * 1024;

/// Directories never worth showing to a judge.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__", ".venv", "dist"];

const JUDGE_SYSTEM_PROMPT: &str = r#"You are a strict grader evaluating the work of an AI coding agent.
You are given the task the agent received, the final state of its workspace and grading criteria.
Judge each criterion independently, using only the evidence shown.

Respond with a single JSON object and nothing else:
{"criteria": [{"criterion": "<criterion text>", "passed": true|false, "reasoning": "<one sentence>"}], "summary": "<one sentence>"}
List the criteria in the order given."#;

fn default_model() -> String {
    DEFAULT_JUDGE_MODEL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_pass_threshold() -> f64 {
    1.0
}

fn default_max_context_chars() -> usize {
    60_000
}

fn default_include_trajectory() -> bool {
    true
}

/// Configuration of a [`RubricScorer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScorerConfig {
    pub name: String,
    /// Statements the workspace must satisfy.
    pub criteria: Vec<String>,
    /// Judge model.
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI-compatible endpoint; defaults to OpenRouter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Environment variable holding the judge's API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Minimum fraction of criteria that must be met.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Budget for inlined workspace content.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Whether the trajectory tail is shown to the judge.
    #[serde(default = "default_include_trajectory")]
    pub include_trajectory: bool,
}

impl RubricScorerConfig {
    pub fn new(name: impl Into<String>, criteria: Vec<String>) -> Self {
        Self {
            name: name.into(),
            criteria,
            model: default_model(),
            api_base: None,
            api_key_env: default_api_key_env(),
            pass_threshold: default_pass_threshold(),
            max_context_chars: default_max_context_chars(),
            include_trajectory: default_include_trajectory(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("scorers[].name".to_string()));
        }
        if self.criteria.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("scorer '{}' criteria", self.name),
                reason: "at least one criterion is required".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(ConfigError::InvalidValue {
                field: format!("scorer '{}' pass_threshold", self.name),
                reason: format!("{} is outside [0, 1]", self.pass_threshold),
            });
        }
        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "scorer '{}' api_key_env",
                self.name
            )));
        }
        Ok(())
    }
}

/// Scorer that asks an LLM to grade the workspace.
pub struct RubricScorer {
    config: RubricScorerConfig,
    provider: Option<Arc<dyn LlmProvider>>,
}

impl RubricScorer {
    /// Creates a scorer that builds its client from the environment on
    /// first use.
    pub fn new(config: RubricScorerConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Uses the given provider instead of an HTTP client.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn provider(&self) -> Result<Arc<dyn LlmProvider>, ScorerError> {
        if let Some(provider) = &self.provider {
            return Ok(Arc::clone(provider));
        }
        let client = ChatClient::from_env(self.config.api_base.as_deref(), &self.config.api_key_env)?;
        Ok(Arc::new(client))
    }

    async fn build_prompt(&self, artifacts_path: &Path) -> Result<String, ScorerError> {
        let workspace = artifacts_path.join("workspace");
        if !tokio::fs::try_exists(&workspace).await? {
            return Err(ScorerError::MissingWorkspace(workspace.display().to_string()));
        }

        let task_prompt = read_task_prompt(artifacts_path).await;
        let budget = self.config.max_context_chars;
        let snapshot = tokio::task::spawn_blocking(move || workspace_snapshot(&workspace, budget))
            .await
            .map_err(|e| ScorerError::Io(std::io::Error::other(e.to_string())))?;

        let mut prompt = String::new();
        prompt.push_str("## Task\n");
        prompt.push_str(task_prompt.as_deref().unwrap_or("(task prompt unavailable)"));
        prompt.push_str("\n\n## Workspace\n");
        prompt.push_str(&snapshot);

        if self.config.include_trajectory {
            if let Some(tail) = trajectory_tail(artifacts_path, budget / 4).await {
                prompt.push_str("\n## Trajectory (most recent events)\n```\n");
                prompt.push_str(&tail);
                prompt.push_str("\n```\n");
            }
        }

        prompt.push_str("\n## Criteria\n");
        for (idx, criterion) in self.config.criteria.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", idx + 1, criterion));
        }
        Ok(prompt)
    }

    fn verdict_to_result(&self, verdict: Verdict) -> ScoreResult {
        let checks: Vec<CheckResult> = self
            .config
            .criteria
            .iter()
            .enumerate()
            .map(|(idx, criterion)| {
                let id = format!("criterion-{}", idx + 1);
                // Match by text first, then by position.
                let judged = verdict
                    .criteria
                    .iter()
                    .find(|c| c.criterion.trim() == criterion.trim())
                    .or_else(|| verdict.criteria.get(idx));
                let check = match judged {
                    Some(c) if c.passed => CheckResult::pass(id, "rubric").with_actual(&c.reasoning),
                    Some(c) => CheckResult::fail(id, "rubric", &c.reasoning),
                    None => CheckResult::fail(id, "rubric", "Judge gave no verdict"),
                };
                check.with_description(criterion)
            })
            .collect();

        let passed = checks.iter().filter(|c| c.passed).count();
        let score = passed as f64 / checks.len().max(1) as f64;

        ScoreResult {
            scorer: self.config.name.clone(),
            overall_pass: score >= self.config.pass_threshold,
            score,
            checks,
            summary: verdict
                .summary
                .unwrap_or_else(|| format!("{}/{} criteria met", passed, self.config.criteria.len())),
            error: None,
        }
    }
}

#[async_trait]
impl Scorer for RubricScorer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn required_env_keys(&self) -> BTreeSet<String> {
        BTreeSet::from([self.config.api_key_env.clone()])
    }

    async fn score(&self, artifacts_path: &Path) -> Result<ScoreResult, ScorerError> {
        let provider = self.provider()?;
        let prompt = self.build_prompt(artifacts_path).await?;
        debug!(scorer = %self.config.name, prompt_chars = prompt.len(), "Requesting rubric verdict");

        let request = GenerationRequest::new(
            &self.config.model,
            vec![Message::system(JUDGE_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(0.0)
        .with_max_tokens(4096);

        let response = provider.generate(request).await?;
        let content = response
            .first_content()
            .ok_or_else(|| ScorerError::Verdict("empty response".to_string()))?;
        let verdict = parse_verdict(content)?;

        let result = self.verdict_to_result(verdict);
        info!(
            scorer = %self.config.name,
            score = result.score,
            passed = result.overall_pass,
            "Rubric scored"
        );
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    criteria: Vec<CriterionVerdict>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CriterionVerdict {
    #[serde(default)]
    criterion: String,
    passed: bool,
    #[serde(default)]
    reasoning: String,
}

/// Extracts the JSON object from a judge reply, tolerating code fences and
/// surrounding prose.
fn parse_verdict(content: &str) -> Result<Verdict, ScorerError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => return Err(ScorerError::Verdict("no JSON object in judge reply".to_string())),
    };
    serde_json::from_str(json).map_err(|e| ScorerError::Verdict(e.to_string()))
}

async fn read_task_prompt(artifacts_path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(artifacts_path.join(METADATA_FILE))
        .await
        .ok()?;
    let metadata: serde_json::Value = serde_json::from_str(&content).ok()?;
    metadata
        .get("prompt")
        .and_then(|p| p.as_str())
        .map(str::to_string)
}

async fn trajectory_tail(artifacts_path: &Path, max_chars: usize) -> Option<String> {
    let content = match tokio::fs::read_to_string(artifacts_path.join(TRAJECTORY_FILE)).await {
        Ok(content) if !content.trim().is_empty() => content,
        _ => tokio::fs::read_to_string(artifacts_path.join("stdout.log"))
            .await
            .ok()?,
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    let count = trimmed.chars().count();
    Some(trimmed.chars().skip(count.saturating_sub(max_chars)).collect())
}

/// Renders the workspace as a file listing followed by file contents,
/// stopping once `budget` characters have been used.
fn workspace_snapshot(workspace: &Path, budget: usize) -> String {
    let mut files: Vec<(PathBuf, u64)> = WalkDir::new(workspace)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let size = e.metadata().ok()?.len();
            let rel = e.path().strip_prefix(workspace).ok()?.to_path_buf();
            Some((rel, size))
        })
        .collect();
    files.sort();

    let mut out = String::from("Files:\n");
    for (rel, size) in &files {
        out.push_str(&format!("- {} ({} bytes)\n", rel.display(), size));
    }
    out.push('\n');

    let mut used = out.len();
    let mut omitted = 0usize;
    for (rel, size) in &files {
        if *size > MAX_FILE_BYTES {
            omitted += 1;
            continue;
        }
        let Ok(content) = std::fs::read_to_string(workspace.join(rel)) else {
            // Binary or unreadable.
            omitted += 1;
            continue;
        };
        let block = format!("### {}\n```\n{}\n```\n", rel.display(), content);
        if used + block.len() > budget {
            omitted += 1;
            continue;
        }
        used += block.len();
        out.push_str(&block);
    }
    if omitted > 0 {
        out.push_str(&format!("\n({} files not shown)\n", omitted));
    }
    out
}
