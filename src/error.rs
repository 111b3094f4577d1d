// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Crate-wide error type for the orchestration kernel.

use thiserror::Error;

/// All failure modes the kernel can surface.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// A state delta targeted a field not in the schema, or violated its policy.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Graph IR failed validation at load time.
    #[error("workflow graph validation failed: {0}")]
    ValidationFailed(String),

    /// A condition id was referenced but never registered.
    #[error("unknown condition: {0}")]
    UnknownCondition(String),

    /// A resource limit was exceeded.
    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    /// Thompson selection had no eligible agent for the candidate set.
    #[error("no eligible agent for category {category}")]
    NoEligibleAgent {
        /// The task category that had no eligible candidate.
        category: String,
    },

    /// A step handler failed.
    #[error("step '{step}' failed ({kind:?}): {message}")]
    StepFailed {
        /// Name of the step node that failed.
        step: String,
        /// Whether the scheduler should retry or terminate the run.
        kind: StepFailureKind,
        /// Human-readable failure detail.
        message: String,
    },

    /// The event hash chain failed to verify; never auto-recovered.
    #[error("event chain integrity violation on stream {stream_id} at seq {seq}")]
    IntegrityViolation {
        /// Stream whose hash chain is broken.
        stream_id: String,
        /// Sequence number at which verification failed.
        seq: u64,
    },

    /// An approval request expired before a decision arrived.
    #[error("approval {approval_id} timed out")]
    ApprovalTimeout {
        /// The approval that expired.
        approval_id: String,
    },

    /// The run (or step) was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// Informational: the progress ledger detected a degenerate execution
    /// pattern. Never fails a run by itself — the scheduler consumes
    /// this to apply a recovery strategy.
    #[error("loop detected: {0:?}")]
    LoopDetected(crate::progress::LoopKind),

    /// Catch-all for conditions with no dedicated variant.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Whether a step failure should be retried or is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFailureKind {
    /// May be retried up to the step's retry limit.
    Recoverable,
    /// Terminates the run via `OnFailure` routing, or marks it `Failed`.
    Fatal,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_violation_display() {
        let err = Error::SchemaViolation("field 'x' not declared".to_string());
        assert_eq!(
            err.to_string(),
            "schema violation: field 'x' not declared"
        );
    }

    #[test]
    fn no_eligible_agent_display() {
        let err = Error::NoEligibleAgent {
            category: "Factual".to_string(),
        };
        assert_eq!(err.to_string(), "no eligible agent for category Factual");
    }

    #[test]
    fn step_failed_display_includes_kind() {
        let err = Error::StepFailed {
            step: "generate".to_string(),
            kind: StepFailureKind::Recoverable,
            message: "timed out".to_string(),
        };
        assert!(err.to_string().contains("generate"));
        assert!(err.to_string().contains("Recoverable"));
    }

    #[test]
    fn integrity_violation_display() {
        let err = Error::IntegrityViolation {
            stream_id: "wf-1".to_string(),
            seq: 3,
        };
        assert_eq!(
            err.to_string(),
            "event chain integrity violation on stream wf-1 at seq 3"
        );
    }
}
