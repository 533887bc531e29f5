//! Script harness adapter.
//!
//! Runs any agent through a user-supplied adapter script. The script is
//! installed into `/usr/local/bin` at image build time and reads the task
//! from the `SKILLBENCH_*` environment variables.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{provider_env_key, HarnessAdapter, HarnessConfig, HarnessType, InvocationRequest};

/// Directory adapter scripts are installed into.
pub const SCRIPT_INSTALL_DIR: &str = "/usr/local/bin";

/// Adapter driven by an external script.
pub struct ScriptAdapter {
    script: Option<PathBuf>,
}

impl ScriptAdapter {
    /// Creates an adapter for the given host-side script.
    pub fn new(script: Option<PathBuf>) -> Self {
        Self { script }
    }

    fn script_name(&self) -> String {
        self.script
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "skillbench-adapter".to_string())
    }
}

impl HarnessAdapter for ScriptAdapter {
    fn harness_type(&self) -> HarnessType {
        HarnessType::Script
    }

    fn required_env_keys(&self, config: &HarnessConfig) -> BTreeSet<String> {
        provider_env_key(config.effective_model())
            .map(|key| BTreeSet::from([key.to_string()]))
            .unwrap_or_default()
    }

    fn build_command(&self, request: &InvocationRequest<'_>) -> Vec<String> {
        let mut cmd = vec![format!("{}/{}", SCRIPT_INSTALL_DIR, self.script_name())];
        cmd.extend(request.extra_args.iter().cloned());
        cmd
    }

    fn adapter_script_path(&self) -> Option<&Path> {
        self.script.as_deref()
    }

    fn setup_commands(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::harness::env_keys;

    #[test]
    fn test_command_points_at_installed_script() {
        let adapter = ScriptAdapter::new(Some(PathBuf::from("/home/me/agents/run-aider.sh")));
        let extra = vec!["--verbose".to_string()];
        let request = InvocationRequest {
            prompt: "p",
            skill_path: "/skills/x",
            workdir: "/workspace",
            timeout: Duration::from_secs(5),
            model: "openrouter/qwen/qwen3-coder",
            extra_args: &extra,
        };

        let cmd = adapter.build_command(&request);
        assert_eq!(cmd, vec!["/usr/local/bin/run-aider.sh", "--verbose"]);

        let env = adapter.build_env(&request);
        assert_eq!(env[env_keys::MODEL], "openrouter/qwen/qwen3-coder");
        assert_eq!(env[env_keys::PROMPT], "p");
    }

    #[test]
    fn test_required_keys_follow_model_provider() {
        let adapter = ScriptAdapter::new(None);
        let config = HarnessConfig::new(HarnessType::Script).with_model("openai/gpt-5");
        assert!(adapter.required_env_keys(&config).contains("OPENAI_API_KEY"));

        let local = HarnessConfig::new(HarnessType::Script).with_model("ollama-llama3");
        assert!(adapter.required_env_keys(&local).is_empty());
    }
}
