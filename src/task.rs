// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Task ledger and task-feature types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single task tracked by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Human-readable description.
    pub description: String,
}

/// The original request plus the decomposed tasks derived from it, with a
/// content hash covering both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLedger {
    /// The original, un-decomposed request text.
    pub original_request: String,
    /// Tasks derived from `original_request`.
    pub tasks: Vec<Task>,
    /// `H(original_request || [t.id] || [t.description])`.
    pub content_hash: String,
}

fn compute_content_hash(original_request: &str, tasks: &[Task]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(original_request.as_bytes());
    for t in tasks {
        hasher.update(t.id.as_bytes());
    }
    for t in tasks {
        hasher.update(t.description.as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl TaskLedger {
    /// Create a ledger for `original_request` with no tasks yet.
    pub fn new(original_request: impl Into<String>) -> Self {
        let original_request = original_request.into();
        let content_hash = compute_content_hash(&original_request, &[]);
        Self {
            original_request,
            tasks: Vec::new(),
            content_hash,
        }
    }

    /// Append a task and recompute `content_hash`.
    #[must_use]
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self.content_hash = compute_content_hash(&self.original_request, &self.tasks);
        self
    }
}

/// Enumerated task categories used by the belief store / Thompson sampler.
pub type Category = String;

/// Feature description of a task used for agent selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFeatures {
    /// Task category (drives which belief is consulted).
    pub category: Category,
    /// Optional complexity estimate in `[0, 1]`.
    pub complexity: Option<f64>,
    /// Bitset of capabilities required to perform this task.
    pub required_capabilities: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_task_recomputes_hash() {
        let ledger = TaskLedger::new("do the thing");
        let before = ledger.content_hash.clone();
        let ledger = ledger.with_task(Task {
            id: "t1".to_string(),
            description: "step one".to_string(),
        });
        assert_ne!(ledger.content_hash, before);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = TaskLedger::new("x").with_task(Task {
            id: "1".to_string(),
            description: "d".to_string(),
        });
        let b = TaskLedger::new("x").with_task(Task {
            id: "1".to_string(),
            description: "d".to_string(),
        });
        assert_eq!(a.content_hash, b.content_hash);
    }
}
