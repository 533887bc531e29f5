//! skillbench: evaluate coding-agent CLIs against skill tasks.
//!
//! This library expands a harness × task matrix, runs every combination in a
//! fresh Docker container, scores the resulting workspace and reports the
//! results per harness/model pair.

pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod llm;
pub mod runner;
pub mod sandbox;
pub mod scoring;
pub mod storage;
pub mod trajectory;

// Re-export commonly used error types
pub use error::{ConfigError, DockerError, EvalError, LlmError, ScorerError, StorageError};
