//! Trajectory parsing and execution metrics.
//!
//! A trajectory is the line-delimited JSON event log a harness produces
//! while it works: messages, tool calls, token usage. Harnesses either
//! write it to `SKILLBENCH_TRAJECTORY_PATH` or stream it on stdout.
//!
//! # Usage
//!
//! ```rust,ignore
//! use skillbench::trajectory::{parse_events, ExecutionMetrics};
//!
//! let events = parse_events(&std::fs::read_to_string("trajectory.jsonl")?);
//! let metrics = ExecutionMetrics::from_events(&events);
//! println!("{} tool calls", metrics.tool_calls);
//! ```

pub mod collector;
pub mod types;

use std::path::Path;

use serde_json::Value;

pub use collector::MetricsCollector;
pub use types::{ExecutionMetrics, TokenUsage};

/// Parses JSONL content into events. Blank and non-JSON lines are skipped,
/// since harnesses interleave plain log lines with events on stdout.
pub fn parse_events(content: &str) -> Vec<Value> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}

impl ExecutionMetrics {
    /// Collects metrics over a sequence of events.
    pub fn from_events(events: &[Value]) -> Self {
        let mut collector = MetricsCollector::new();
        for event in events {
            collector.observe(event);
        }
        collector.finish()
    }
}

/// Metrics for a finished job.
///
/// Prefers the trajectory file in `artifacts_dir`; falls back to events on
/// `stdout`. Returns `None` when neither contains any event.
pub async fn metrics_for_job(artifacts_dir: &Path, stdout: &str) -> Option<ExecutionMetrics> {
    let path = artifacts_dir.join(crate::harness::TRAJECTORY_FILE);
    let mut events = match tokio::fs::read_to_string(&path).await {
        Ok(content) => parse_events(&content),
        Err(_) => Vec::new(),
    };
    if events.is_empty() {
        events = parse_events(stdout);
    }
    if events.is_empty() {
        return None;
    }
    Some(ExecutionMetrics::from_events(&events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_noise() {
        let content = "starting agent\n{\"type\":\"a\"}\n\n{broken\n  {\"type\":\"b\"}  \n";
        let events = parse_events(content);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["type"], "b");
    }

    #[tokio::test]
    async fn test_metrics_prefer_trajectory_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("trajectory.jsonl"),
            "{\"type\":\"tool_call\",\"command\":\"ls\"}\n",
        )
        .unwrap();

        let stdout = "{\"type\":\"message\",\"role\":\"assistant\"}\n";
        let metrics = metrics_for_job(temp.path(), stdout).await.unwrap();
        assert_eq!(metrics.tool_calls, 1);
        assert_eq!(metrics.assistant_turns, 0);
    }

    #[tokio::test]
    async fn test_metrics_fall_back_to_stdout() {
        let temp = TempDir::new().unwrap();
        let stdout = "{\"type\":\"message\",\"role\":\"assistant\"}\n";
        let metrics = metrics_for_job(temp.path(), stdout).await.unwrap();
        assert_eq!(metrics.assistant_turns, 1);

        assert!(metrics_for_job(temp.path(), "plain text").await.is_none());
    }
}
