// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Top-level run record.
//!
//! `RunHandle` is the thing callers actually hold once a workflow starts
//! executing, distinct from the compiled graph definition it was started
//! from.

use serde::{Deserialize, Serialize};

/// Terminal or in-flight status of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The scheduler is actively ticking this run.
    Running,
    /// A terminal node was reached.
    Completed,
    /// The run ended in an unrecoverable error.
    Failed(String),
    /// The run is suspended pending a human decision beyond a timeout.
    Escalated,
    /// The run was cooperatively cancelled.
    Cancelled,
    /// A budgeted resource was exhausted.
    BudgetExhausted(String),
}

impl RunStatus {
    /// Whether this status represents a run that will not progress further.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// A handle to one workflow instance: its identity, its event stream, and
/// its current status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHandle {
    /// Workflow instance identifier.
    pub workflow_id: String,
    /// Event ledger stream id backing this run (usually equal to `workflow_id`).
    pub stream_id: String,
    /// Current run status.
    pub status: RunStatus,
}

impl RunHandle {
    /// Start a new, freshly-`Running` handle.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        let workflow_id = workflow_id.into();
        Self {
            stream_id: workflow_id.clone(),
            workflow_id,
            status: RunStatus::Running,
        }
    }

    /// Transition to a terminal (or `Escalated`) status.
    pub fn transition(&mut self, status: RunStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_running() {
        let handle = RunHandle::new("wf-1");
        assert_eq!(handle.status, RunStatus::Running);
        assert!(!handle.status.is_terminal());
    }

    #[test]
    fn transition_to_completed_is_terminal() {
        let mut handle = RunHandle::new("wf-1");
        handle.transition(RunStatus::Completed);
        assert!(handle.status.is_terminal());
    }

    #[test]
    fn stream_id_defaults_to_workflow_id() {
        let handle = RunHandle::new("wf-42");
        assert_eq!(handle.stream_id, "wf-42");
    }
}
