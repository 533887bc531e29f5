//! Execution metrics derived from a trajectory.

use serde::{Deserialize, Serialize};

/// Token usage reported by a harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Uncached input tokens.
    pub input_tokens: u64,

    /// Output tokens.
    pub output_tokens: u64,

    /// Input tokens served from the provider's prompt cache.
    pub cached_tokens: u64,
}

impl TokenUsage {
    /// Creates a new TokenUsage with the specified values.
    pub fn new(input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_tokens,
        }
    }

    /// Adds another TokenUsage to this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cached_tokens += other.cached_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cached_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Counters extracted from one job's trajectory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Number of parsed events.
    pub event_count: usize,

    /// Tool invocations of any kind.
    pub tool_calls: usize,

    /// Shell commands the agent ran, in order.
    pub shell_commands: Vec<String>,

    /// Assistant messages.
    pub assistant_turns: usize,

    /// Token usage summed over the run.
    pub tokens: TokenUsage,

    /// Cost in USD, when the harness reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_add() {
        let mut usage = TokenUsage::new(100, 50, 10);
        usage.add(&TokenUsage::new(200, 100, 0));
        assert_eq!(usage, TokenUsage::new(300, 150, 10));
        assert_eq!(usage.total(), 460);
    }

    #[test]
    fn test_empty_usage() {
        assert!(TokenUsage::default().is_empty());
        assert!(!TokenUsage::new(0, 1, 0).is_empty());
    }
}
