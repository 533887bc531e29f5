//! Adapters for the agent CLIs skillbench knows how to install.
//!
//! All three CLIs are npm packages that run headless and stream JSON
//! events on stdout, which the executor keeps as the trajectory.

use std::collections::{BTreeMap, BTreeSet};

use super::{base_env, HarnessAdapter, HarnessConfig, HarnessType, InvocationRequest};

/// Adapter for Claude Code, Codex and Gemini CLI.
pub struct BuiltinAdapter {
    harness_type: HarnessType,
}

impl BuiltinAdapter {
    /// Creates an adapter for a built-in harness type.
    ///
    /// `HarnessType::Script` is not a built-in harness; `create_adapter`
    /// never routes it here.
    pub fn new(harness_type: HarnessType) -> Self {
        Self { harness_type }
    }

    fn npm_package(&self) -> &'static str {
        match self.harness_type {
            HarnessType::ClaudeCode => "@anthropic-ai/claude-code",
            HarnessType::Codex => "@openai/codex",
            HarnessType::Gemini | HarnessType::Script => "@google/gemini-cli",
        }
    }

    fn credential(&self) -> &'static str {
        match self.harness_type {
            HarnessType::ClaudeCode => "ANTHROPIC_API_KEY",
            HarnessType::Codex => "OPENAI_API_KEY",
            HarnessType::Gemini | HarnessType::Script => "GEMINI_API_KEY",
        }
    }
}

impl HarnessAdapter for BuiltinAdapter {
    fn harness_type(&self) -> HarnessType {
        self.harness_type
    }

    fn required_env_keys(&self, _config: &HarnessConfig) -> BTreeSet<String> {
        BTreeSet::from([self.credential().to_string()])
    }

    fn build_command(&self, request: &InvocationRequest<'_>) -> Vec<String> {
        let mut cmd: Vec<String> = match self.harness_type {
            HarnessType::ClaudeCode => vec![
                "claude".into(),
                "--print".into(),
                "--model".into(),
                request.model.into(),
                "--output-format".into(),
                "stream-json".into(),
                "--verbose".into(),
                "--dangerously-skip-permissions".into(),
            ],
            HarnessType::Codex => vec![
                "codex".into(),
                "exec".into(),
                "--json".into(),
                "--model".into(),
                request.model.into(),
                "--skip-git-repo-check".into(),
                "--dangerously-bypass-approvals-and-sandbox".into(),
            ],
            HarnessType::Gemini | HarnessType::Script => vec![
                "gemini".into(),
                "--model".into(),
                request.model.into(),
                "--yolo".into(),
                "--output-format".into(),
                "stream-json".into(),
            ],
        };

        cmd.extend(request.extra_args.iter().cloned());

        // Gemini takes the prompt as a flag value, the others positionally.
        if matches!(self.harness_type, HarnessType::Gemini) {
            cmd.push("--prompt".into());
        }
        cmd.push(request.prompt.to_string());
        cmd
    }

    fn build_env(&self, request: &InvocationRequest<'_>) -> BTreeMap<String, String> {
        let mut env = base_env(request);
        match self.harness_type {
            HarnessType::ClaudeCode => {
                env.insert("DISABLE_AUTOUPDATER".into(), "1".into());
                // Permits --dangerously-skip-permissions when running as root.
                env.insert("IS_SANDBOX".into(), "1".into());
            }
            HarnessType::Codex => {
                env.insert("CODEX_HOME".into(), "/root/.codex".into());
            }
            HarnessType::Gemini | HarnessType::Script => {}
        }
        env
    }

    fn setup_commands(&self) -> Vec<String> {
        vec![format!("npm install -g {}", self.npm_package())]
    }
}
