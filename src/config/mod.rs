//! Evaluation configuration.
//!
//! An evaluation is described by a single YAML file naming the skill under
//! test, the container environment, the harness/model matrix, the scorers
//! and the tasks. Relative paths are resolved against the config file's
//! directory at load time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::harness::{HarnessConfig, HarnessType};
use crate::scoring::ScorerConfig;

/// Default number of combinations in flight at once.
pub const DEFAULT_MAX_PARALLEL: usize = 8;

/// Default per-task container timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default working directory inside the sandbox.
pub const DEFAULT_WORKDIR: &str = "/workspace";

/// Default base image when the environment names none.
pub const DEFAULT_BASE_IMAGE: &str = "node:22-bookworm";

/// Top-level evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Human-readable name of this evaluation.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Skill directory copied into every image.
    pub skill: PathBuf,
    /// Container environment shared by every task.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Harness/model pairs to evaluate. Empty means the default harness.
    #[serde(default)]
    pub harnesses: Vec<HarnessConfig>,
    /// Scorers applied to every task.
    #[serde(default)]
    pub scorers: Vec<ScorerConfig>,
    /// Tasks to run.
    pub tasks: Vec<TaskConfig>,
    /// Scheduling and output settings.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Container environment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Base image every evaluation image starts from.
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Files or directories copied into the working directory.
    #[serde(default)]
    pub layers: Vec<PathBuf>,
    /// Extra build steps run after harness setup.
    #[serde(default)]
    pub setup_commands: Vec<String>,
    /// Environment variables that must be present on the host.
    #[serde(default)]
    pub required_env: Vec<String>,
    /// Hosts the sandbox is expected to reach.
    #[serde(default)]
    pub network_allowlist: Vec<String>,
    /// Whether containers share the host network.
    #[serde(default = "default_true")]
    pub use_host_network: bool,
    /// Working directory inside the container.
    #[serde(default = "default_workdir")]
    pub workdir: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            layers: Vec::new(),
            setup_commands: Vec::new(),
            required_env: Vec::new(),
            network_allowlist: Vec::new(),
            use_host_network: true,
            workdir: default_workdir(),
        }
    }
}

/// A single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Unique task identifier.
    pub id: String,
    /// Prompt handed to the harness.
    #[serde(default)]
    pub prompt: String,
    /// File to read the prompt from, instead of `prompt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,
    /// Container timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Task-specific scorers, appended to the global ones.
    #[serde(default)]
    pub scorers: Vec<ScorerConfig>,
}

impl TaskConfig {
    /// Creates a task with the default timeout and no scorers.
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            prompt_file: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            scorers: Vec::new(),
        }
    }

    /// Sets the timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Adds a task-specific scorer.
    pub fn with_scorer(mut self, scorer: ScorerConfig) -> Self {
        self.scorers.push(scorer);
        self
    }

    /// Timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scheduling and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of combinations in flight.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Root directory for run artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            output_dir: default_output_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_image() -> String {
    DEFAULT_BASE_IMAGE.to_string()
}

fn default_workdir() -> String {
    DEFAULT_WORKDIR.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./eval-runs")
}

impl EvalConfig {
    /// Creates a config with default environment and execution settings.
    pub fn new(name: impl Into<String>, skill: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: None,
            skill: skill.into(),
            environment: EnvironmentConfig::default(),
            harnesses: Vec::new(),
            scorers: Vec::new(),
            tasks: Vec::new(),
            execution: ExecutionConfig::default(),
        }
    }

    /// Adds a harness/model pair.
    pub fn with_harness(mut self, harness: HarnessConfig) -> Self {
        self.harnesses.push(harness);
        self
    }

    /// Adds a task.
    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.tasks.push(task);
        self
    }

    /// Adds a global scorer.
    pub fn with_scorer(mut self, scorer: ScorerConfig) -> Self {
        self.scorers.push(scorer);
        self
    }

    /// Sets the parallelism bound.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.execution.max_parallel = max_parallel;
        self
    }

    /// Sets the artifact output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.execution.output_dir = dir.into();
        self
    }

    /// Loads, resolves and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_paths(&base_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a config from YAML without resolving paths.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolves relative paths against `base_dir` and inlines prompt files.
    pub fn resolve_paths(&mut self, base_dir: &Path) -> Result<(), ConfigError> {
        self.skill = resolve(base_dir, &self.skill);
        self.execution.output_dir = resolve(base_dir, &self.execution.output_dir);
        for layer in &mut self.environment.layers {
            *layer = resolve(base_dir, layer);
        }
        for harness in &mut self.harnesses {
            if let Some(script) = harness.adapter_script.as_mut() {
                *script = resolve(base_dir, script);
            }
        }
        for task in &mut self.tasks {
            if let Some(prompt_file) = task.prompt_file.take() {
                let prompt_path = resolve(base_dir, &prompt_file);
                task.prompt =
                    fs::read_to_string(&prompt_path).map_err(|source| ConfigError::Read {
                        path: prompt_path.display().to_string(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Checks structural invariants of the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(ConfigError::MissingField("tasks".to_string()));
        }
        if self.execution.max_parallel == 0 {
            return Err(ConfigError::InvalidValue {
                field: "execution.max_parallel".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !is_valid_task_id(&task.id) {
                return Err(ConfigError::InvalidTaskId(task.id.clone()));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(ConfigError::DuplicateTask(task.id.clone()));
            }
            if task.prompt.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("tasks[{}].prompt", task.id)));
            }
            if task.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("tasks[{}].timeout_secs", task.id),
                    reason: "must be greater than zero".to_string(),
                });
            }

            let mut names = HashSet::new();
            for scorer in self.scorers_for(task) {
                scorer.validate()?;
                if !names.insert(scorer.name()) {
                    return Err(ConfigError::DuplicateScorer {
                        task: task.id.clone(),
                        scorer: scorer.name(),
                    });
                }
            }
        }

        // Identities name artifact directories, so they must not collide.
        let mut identities = HashSet::new();
        for harness in &self.harnesses {
            harness.validate()?;
            if !identities.insert(harness.identity()) {
                return Err(ConfigError::InvalidValue {
                    field: "harnesses".to_string(),
                    reason: format!("'{}' is configured more than once", harness.display_name()),
                });
            }
        }

        Ok(())
    }

    /// Global scorers followed by the task's own scorers.
    pub fn scorers_for<'a>(&'a self, task: &'a TaskConfig) -> impl Iterator<Item = &'a ScorerConfig> {
        self.scorers.iter().chain(task.scorers.iter())
    }

    /// Configured harnesses, or the default harness when none are configured.
    pub fn effective_harnesses(&self) -> Vec<HarnessConfig> {
        if self.harnesses.is_empty() {
            vec![HarnessConfig::new(HarnessType::default())]
        } else {
            self.harnesses.clone()
        }
    }

    /// Keeps only the named harnesses and tasks. Empty filters keep everything.
    pub fn retain(&mut self, harness_filter: &[String], task_filter: &[String]) {
        if !harness_filter.is_empty() {
            self.harnesses.retain(|h| {
                harness_filter
                    .iter()
                    .any(|f| f == h.harness_type.as_str() || *f == h.display_name())
            });
        }
        if !task_filter.is_empty() {
            self.tasks.retain(|t| task_filter.contains(&t.id));
        }
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Task IDs become directory names and image tag components.
pub fn is_valid_task_id(id: &str) -> bool {
    is_valid_path_name(id)
}

/// A single path component made of `[A-Za-z0-9._-]`, never `.` or `..`.
pub fn is_valid_path_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
name: pdf-skill
skill: ./skills/pdf
environment:
  base_image: python:3.12-slim
  layers: [./fixtures/report.pdf]
  required_env: [GITHUB_TOKEN]
harnesses:
  - type: claude-code
    model: claude-sonnet-4-5
  - type: codex
    model: gpt-5-codex
scorers:
  - type: pattern
    name: output
    checks:
      - kind: file_exists
        path: summary.md
tasks:
  - id: summarize
    prompt: Summarize report.pdf into summary.md
    timeout_secs: 300
  - id: extract-tables
    prompt: Extract every table
"#;

    #[test]
    fn test_parse_sample() {
        let config = EvalConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.name, "pdf-skill");
        assert_eq!(config.harnesses.len(), 2);
        assert_eq!(config.harnesses[1].harness_type, HarnessType::Codex);
        assert_eq!(config.tasks[0].timeout_secs, 300);
        assert_eq!(config.tasks[1].timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.execution.max_parallel, DEFAULT_MAX_PARALLEL);
        assert_eq!(config.environment.workdir, DEFAULT_WORKDIR);
        assert!(config.environment.use_host_network);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_resolves_relative_paths_and_prompt_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("prompts")).unwrap();
        fs::write(temp.path().join("prompts/one.md"), "Do the thing").unwrap();
        fs::write(
            temp.path().join("eval.yaml"),
            "name: x\nskill: skill\ntasks:\n  - id: one\n    prompt_file: prompts/one.md\n",
        )
        .unwrap();

        let config = EvalConfig::load(temp.path().join("eval.yaml")).unwrap();
        assert_eq!(config.skill, temp.path().join("skill"));
        assert_eq!(config.tasks[0].prompt, "Do the thing");
        assert_eq!(config.execution.output_dir, temp.path().join("./eval-runs"));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let config = EvalConfig::new("dup", "/skill")
            .with_task(TaskConfig::new("a", "p"))
            .with_task(TaskConfig::new("a", "q"));
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateTask(id)) if id == "a"));
    }

    #[test]
    fn test_invalid_task_id_rejected() {
        let config = EvalConfig::new("bad", "/skill").with_task(TaskConfig::new("a/b", "p"));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTaskId(_))));
    }

    #[test]
    fn test_zero_parallel_rejected() {
        let config = EvalConfig::new("x", "/skill")
            .with_task(TaskConfig::new("a", "p"))
            .with_max_parallel(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_duplicate_harness_rejected() {
        let config = EvalConfig::new("x", "/skill")
            .with_task(TaskConfig::new("a", "p"))
            .with_harness(HarnessConfig::new(HarnessType::Codex))
            .with_harness(HarnessConfig::new(HarnessType::Codex).with_extra_arg("--full-auto"));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_effective_harnesses_defaults_to_one() {
        let config = EvalConfig::new("x", "/skill");
        let harnesses = config.effective_harnesses();
        assert_eq!(harnesses.len(), 1);
        assert_eq!(harnesses[0].harness_type, HarnessType::default());
        assert!(!harnesses[0].model.is_empty());
    }

    #[test]
    fn test_retain_filters() {
        let mut config = EvalConfig::from_yaml(SAMPLE).unwrap();
        config.retain(&["codex".to_string()], &["summarize".to_string()]);
        assert_eq!(config.harnesses.len(), 1);
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].id, "summarize");
    }

    #[test]
    fn test_task_ids() {
        assert!(is_valid_task_id("fix-bug_1.2"));
        assert!(!is_valid_task_id(""));
        assert!(!is_valid_task_id("a b"));
        assert!(!is_valid_task_id(".."));
        assert!(!is_valid_task_id("a/b"));
    }
}
