//! Per-model completion tracking.

use std::collections::HashMap;

use tracing::warn;

use super::result::{ModelKey, TaskResult};

/// Counts outstanding combinations per harness/model pair and releases a
/// pair's batch when its last result arrives.
///
/// Owned by a single collector, so it needs no locking of its own.
#[derive(Debug, Default)]
pub struct ModelBatchTracker {
    remaining: HashMap<ModelKey, usize>,
    batches: HashMap<ModelKey, Vec<TaskResult>>,
}

impl ModelBatchTracker {
    /// Creates a tracker expecting one result per key occurrence.
    pub fn new(keys: impl IntoIterator<Item = ModelKey>) -> Self {
        let mut remaining: HashMap<ModelKey, usize> = HashMap::new();
        for key in keys {
            *remaining.entry(key).or_default() += 1;
        }
        Self {
            remaining,
            batches: HashMap::new(),
        }
    }

    /// Records a result. Returns the complete batch when this was the last
    /// outstanding result for its key; each key is released at most once.
    pub fn record(&mut self, result: &TaskResult) -> Option<(ModelKey, Vec<TaskResult>)> {
        let key = result.model_key();
        let Some(remaining) = self.remaining.get_mut(&key) else {
            warn!(model = %key, task_id = %result.task_id, "Result for an unexpected model");
            return None;
        };

        self.batches.entry(key.clone()).or_default().push(result.clone());
        *remaining -= 1;
        if *remaining > 0 {
            return None;
        }

        self.remaining.remove(&key);
        let batch = self.batches.remove(&key).unwrap_or_default();
        Some((key, batch))
    }

    /// Keys with results still outstanding.
    pub fn pending(&self) -> usize {
        self.remaining.len()
    }
}
