//! Harness adapters for the coding-agent CLIs under evaluation.
//!
//! Each adapter knows how to:
//! 1. Name the credentials its CLI needs
//! 2. Install the CLI into an evaluation image
//! 3. Build the command line and environment for one task

pub mod builtin;
pub mod script;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use builtin::BuiltinAdapter;
pub use script::ScriptAdapter;

/// Mount point of the artifacts directory inside every container.
pub const CONTAINER_ARTIFACTS_DIR: &str = "/skillbench/artifacts";

/// Trajectory file name inside the artifacts directory.
pub const TRAJECTORY_FILE: &str = "trajectory.jsonl";

/// Environment variable names every harness receives.
pub mod env_keys {
    pub const PROMPT: &str = "SKILLBENCH_PROMPT";
    pub const SKILL_PATH: &str = "SKILLBENCH_SKILL_PATH";
    pub const WORKDIR: &str = "SKILLBENCH_WORKDIR";
    pub const TIMEOUT: &str = "SKILLBENCH_TIMEOUT";
    pub const MODEL: &str = "SKILLBENCH_MODEL";
    pub const TRAJECTORY_PATH: &str = "SKILLBENCH_TRAJECTORY_PATH";
}

/// Supported harness types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarnessType {
    /// Anthropic's Claude Code CLI.
    ClaudeCode,
    /// OpenAI's Codex CLI.
    Codex,
    /// Google's Gemini CLI.
    Gemini,
    /// Any agent driven through a user-supplied adapter script.
    Script,
}

impl HarnessType {
    /// Stable kebab-case name used in configs and artifact paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            HarnessType::ClaudeCode => "claude-code",
            HarnessType::Codex => "codex",
            HarnessType::Gemini => "gemini",
            HarnessType::Script => "script",
        }
    }

    /// Returns the display name for this harness type.
    pub fn display_name(&self) -> &'static str {
        match self {
            HarnessType::ClaudeCode => "Claude Code",
            HarnessType::Codex => "Codex",
            HarnessType::Gemini => "Gemini CLI",
            HarnessType::Script => "Script",
        }
    }

    /// Model used when a harness config names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            HarnessType::ClaudeCode => "claude-sonnet-4-5",
            HarnessType::Codex => "gpt-5-codex",
            HarnessType::Gemini => "gemini-2.5-pro",
            HarnessType::Script => "openrouter/anthropic/claude-sonnet-4.5",
        }
    }
}

impl Default for HarnessType {
    fn default() -> Self {
        Self::ClaudeCode
    }
}

impl std::fmt::Display for HarnessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HarnessType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude-code" | "claude" | "claudecode" => Ok(HarnessType::ClaudeCode),
            "codex" => Ok(HarnessType::Codex),
            "gemini" | "gemini-cli" => Ok(HarnessType::Gemini),
            "script" | "generic" => Ok(HarnessType::Script),
            other => Err(ConfigError::UnknownHarness(other.to_string())),
        }
    }
}

/// One harness/model pair of the evaluation matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Which harness to run.
    #[serde(rename = "type")]
    pub harness_type: HarnessType,
    /// Model identifier passed to the harness.
    #[serde(default)]
    pub model: String,
    /// Extra CLI arguments appended to the harness command.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Static environment values for this harness.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Adapter script (script harness only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_script: Option<PathBuf>,
}

impl HarnessConfig {
    /// Creates a harness config with the type's default model.
    pub fn new(harness_type: HarnessType) -> Self {
        Self {
            harness_type,
            model: harness_type.default_model().to_string(),
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            adapter_script: None,
        }
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the adapter script.
    pub fn with_adapter_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.adapter_script = Some(path.into());
        self
    }

    /// Adds an extra CLI argument.
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Model, falling back to the harness default.
    pub fn effective_model(&self) -> &str {
        if self.model.trim().is_empty() {
            self.harness_type.default_model()
        } else {
            &self.model
        }
    }

    /// `harness:model` label used in logs and reports.
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.harness_type, self.effective_model())
    }

    /// Filesystem- and tag-safe identity of this harness/model pair.
    pub fn identity(&self) -> String {
        sanitize_identity(&format!("{}_{}", self.harness_type, self.effective_model()))
    }

    /// Checks harness-specific requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harness_type == HarnessType::Script && self.adapter_script.is_none() {
            return Err(ConfigError::HarnessField {
                harness: self.display_name(),
                field: "adapter_script".to_string(),
            });
        }
        Ok(())
    }
}

/// Replaces path and tag separators in a harness/model string.
pub fn sanitize_identity(raw: &str) -> String {
    raw.replace(['/', ':'], "_")
}

/// Everything an adapter needs to build one task invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest<'a> {
    /// Task prompt.
    pub prompt: &'a str,
    /// Skill location inside the container.
    pub skill_path: &'a str,
    /// Working directory inside the container.
    pub workdir: &'a str,
    /// Task timeout.
    pub timeout: Duration,
    /// Model identifier.
    pub model: &'a str,
    /// Extra CLI arguments from the harness config.
    pub extra_args: &'a [String],
}

/// Trait for harness adapters.
///
/// Adapters are pure translators: they never touch the container runtime.
pub trait HarnessAdapter: Send + Sync {
    /// Returns the harness type.
    fn harness_type(&self) -> HarnessType;

    /// Environment variable names that must be present on the host.
    fn required_env_keys(&self, config: &HarnessConfig) -> BTreeSet<String>;

    /// Ordered argument list executed inside the container.
    fn build_command(&self, request: &InvocationRequest<'_>) -> Vec<String>;

    /// Environment for the command. Always includes the shared
    /// `SKILLBENCH_*` variables.
    fn build_env(&self, request: &InvocationRequest<'_>) -> BTreeMap<String, String> {
        base_env(request)
    }

    /// Script copied into the image's executable search path, if any.
    fn adapter_script_path(&self) -> Option<&Path> {
        None
    }

    /// Image build steps that install the harness.
    fn setup_commands(&self) -> Vec<String>;
}

/// The shared `SKILLBENCH_*` environment.
pub fn base_env(request: &InvocationRequest<'_>) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(env_keys::PROMPT.to_string(), request.prompt.to_string());
    env.insert(env_keys::SKILL_PATH.to_string(), request.skill_path.to_string());
    env.insert(env_keys::WORKDIR.to_string(), request.workdir.to_string());
    env.insert(
        env_keys::TIMEOUT.to_string(),
        request.timeout.as_secs().to_string(),
    );
    env.insert(env_keys::MODEL.to_string(), request.model.to_string());
    env.insert(
        env_keys::TRAJECTORY_PATH.to_string(),
        format!("{}/{}", CONTAINER_ARTIFACTS_DIR, TRAJECTORY_FILE),
    );
    env
}

/// Credential variable for a `provider/model` identifier.
pub fn provider_env_key(model: &str) -> Option<&'static str> {
    let provider = model.split('/').next().unwrap_or_default().to_lowercase();
    match provider.as_str() {
        "anthropic" | "claude" => Some("ANTHROPIC_API_KEY"),
        "openai" | "gpt" => Some("OPENAI_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "google" | "gemini" => Some("GEMINI_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        _ => None,
    }
}

/// Creates the adapter for a harness config.
pub fn create_adapter(config: &HarnessConfig) -> Box<dyn HarnessAdapter> {
    match config.harness_type {
        HarnessType::ClaudeCode | HarnessType::Codex | HarnessType::Gemini => {
            Box::new(BuiltinAdapter::new(config.harness_type))
        }
        HarnessType::Script => Box::new(ScriptAdapter::new(config.adapter_script.clone())),
    }
}
