//! Metric collection over harness event streams.
//!
//! Understands the JSONL events emitted by Claude Code (`stream-json`),
//! Codex (`exec --json`) and Gemini CLI (`stream-json`), plus a small
//! generic vocabulary for adapter scripts:
//!
//! ```text
//! {"type": "tool_call", "name": "shell", "command": "ls"}
//! {"type": "message", "role": "assistant", "content": "..."}
//! {"type": "usage", "input_tokens": 10, "output_tokens": 5, "cost_usd": 0.01}
//! ```
//!
//! Unknown events are counted but otherwise ignored.

use serde_json::Value;

use super::types::{ExecutionMetrics, TokenUsage};

/// Tool names that run a shell command.
const SHELL_TOOLS: &[&str] = &["Bash", "bash", "shell", "run_shell_command", "exec_command"];

/// Accumulates [`ExecutionMetrics`] one event at a time.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: ExecutionMetrics,
    /// Per-message or per-turn usage.
    summed: TokenUsage,
    /// Totals from a final result event, which supersede `summed`.
    reported: Option<TokenUsage>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event.
    pub fn observe(&mut self, event: &Value) {
        self.metrics.event_count += 1;

        let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            // Claude Code
            "assistant" => self.observe_claude_message(event),
            "result" => self.observe_result(event),

            // Codex
            "item.completed" => {
                if let Some(item) = event.get("item") {
                    self.observe_codex_item(item);
                }
            }
            "turn.completed" => {
                if let Some(usage) = event.get("usage") {
                    self.summed.add(&usage_from(usage));
                }
            }

            // Gemini CLI
            "tool_use" => {
                let name = event.get("tool_name").and_then(Value::as_str);
                let command = event
                    .get("parameters")
                    .and_then(|p| p.get("command"))
                    .and_then(Value::as_str);
                self.record_tool(name, command);
            }

            // Generic adapter scripts; Gemini also uses `message`.
            "message" => {
                let assistant = event.get("role").and_then(Value::as_str) == Some("assistant");
                let delta = event.get("delta").and_then(Value::as_bool).unwrap_or(false);
                if assistant && !delta {
                    self.metrics.assistant_turns += 1;
                }
            }
            "tool_call" => {
                let name = event.get("name").and_then(Value::as_str);
                let command = event.get("command").and_then(Value::as_str);
                self.record_tool(name, command);
            }
            "usage" => {
                self.summed.add(&usage_from(event));
                self.observe_cost(event);
            }
            _ => {}
        }
    }

    fn observe_claude_message(&mut self, event: &Value) {
        self.metrics.assistant_turns += 1;
        let Some(message) = event.get("message") else {
            return;
        };

        if let Some(content) = message.get("content").and_then(Value::as_array) {
            for block in content {
                if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                    continue;
                }
                let name = block.get("name").and_then(Value::as_str);
                let command = block
                    .get("input")
                    .and_then(|i| i.get("command"))
                    .and_then(Value::as_str);
                self.record_tool(name, command);
            }
        }

        if let Some(usage) = message.get("usage") {
            self.summed.add(&usage_from(usage));
        }
    }

    fn observe_codex_item(&mut self, item: &Value) {
        match item.get("type").and_then(Value::as_str).unwrap_or_default() {
            "agent_message" => self.metrics.assistant_turns += 1,
            "command_execution" => {
                self.metrics.tool_calls += 1;
                if let Some(command) = item.get("command").and_then(Value::as_str) {
                    self.metrics.shell_commands.push(command.to_string());
                }
            }
            "mcp_tool_call" | "file_change" | "web_search" => self.metrics.tool_calls += 1,
            _ => {}
        }
    }

    fn observe_result(&mut self, event: &Value) {
        // Claude reports `usage`, Gemini reports `stats`.
        if let Some(usage) = event.get("usage").or_else(|| event.get("stats")) {
            let usage = usage_from(usage);
            if !usage.is_empty() {
                self.reported = Some(usage);
            }
        }
        self.observe_cost(event);
    }

    fn observe_cost(&mut self, event: &Value) {
        let cost = event
            .get("total_cost_usd")
            .or_else(|| event.get("cost_usd"))
            .and_then(Value::as_f64);
        if let Some(cost) = cost {
            self.metrics.cost_usd = Some(self.metrics.cost_usd.unwrap_or(0.0) + cost);
        }
    }

    fn record_tool(&mut self, name: Option<&str>, command: Option<&str>) {
        self.metrics.tool_calls += 1;
        let is_shell = name.map_or(true, |n| SHELL_TOOLS.contains(&n));
        if let (true, Some(command)) = (is_shell, command) {
            self.metrics.shell_commands.push(command.to_string());
        }
    }

    /// Returns the collected metrics.
    pub fn finish(mut self) -> ExecutionMetrics {
        self.metrics.tokens = self.reported.unwrap_or(self.summed);
        self.metrics
    }
}

fn field_u64(value: &Value, names: &[&str]) -> u64 {
    names
        .iter()
        .find_map(|name| value.get(*name).and_then(Value::as_u64))
        .unwrap_or(0)
}

/// Reads token counts from the usage shapes the supported CLIs emit.
fn usage_from(value: &Value) -> TokenUsage {
    TokenUsage::new(
        field_u64(value, &["input_tokens", "prompt_tokens"]),
        field_u64(value, &["output_tokens", "completion_tokens"]),
        field_u64(
            value,
            &["cache_read_input_tokens", "cached_input_tokens", "cached_tokens", "cached"],
        ),
    )
}
