//! Error types for skillbench operations.
//!
//! Defines error types for every subsystem:
//! - Evaluation config loading and validation
//! - Docker image builds and container jobs
//! - Artifact storage
//! - Scorers and the LLM client they use
//! - Run-level orchestration failures

use thiserror::Error;

/// Errors that can occur while loading or validating an evaluation config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Invalid task ID '{0}': must be non-empty and contain only alphanumeric characters, '.', '-' and '_'")]
    InvalidTaskId(String),

    #[error("Duplicate task ID '{0}'")]
    DuplicateTask(String),

    #[error("Duplicate scorer name '{scorer}' for task '{task}'")]
    DuplicateScorer { task: String, scorer: String },

    #[error("Unknown harness type: {0}")]
    UnknownHarness(String),

    #[error("Harness '{harness}' is missing '{field}'")]
    HarnessField { harness: String, field: String },

    #[error("Invalid regex pattern '{pattern}' in scorer '{scorer}': {message}")]
    InvalidPattern {
        scorer: String,
        pattern: String,
        message: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    #[error("Failed to stage build context: {0}")]
    Staging(String),

    #[error("Docker build timed out after {seconds} seconds")]
    BuildTimeout { seconds: u64 },

    #[error("Container execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Container exited with non-zero code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Failed to launch container CLI: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the artifact store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run '{0}' not found")]
    RunNotFound(String),

    #[error("Task directory not found: {0}")]
    TaskNotFound(String),

    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),

    #[error("Invalid artifact name '{0}'")]
    InvalidName(String),
}

/// Errors raised by a scorer while judging a task's artifacts.
#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("Workspace missing at {0}")]
    MissingWorkspace(String),

    #[error("Invalid scorer configuration: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Could not parse judge verdict: {0}")]
    Verdict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: {0} environment variable not set")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Run-level errors. Only credential resolution is fatal to a whole run.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_lists_every_name() {
        let err = EvalError::MissingCredentials(vec![
            "ANTHROPIC_API_KEY".to_string(),
            "OPENAI_API_KEY".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: ANTHROPIC_API_KEY, OPENAI_API_KEY"
        );
    }

    #[test]
    fn test_timeout_message_mentions_timeout() {
        let err = DockerError::Timeout { seconds: 30 };
        assert!(err.to_string().contains("timed out"));
    }
}
