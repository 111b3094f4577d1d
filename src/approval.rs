// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Approval Coordinator (C10).
//!
//! Generalizes the builtin `ApprovalNode` request/response channel pattern
//! to the kernel's richer `Approval` record: a typed request with a set of
//! reviewer-facing options, an optional deadline, and a decision that
//! carries free-text feedback alongside the chosen option.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::constants::DEFAULT_MPSC_CHANNEL_CAPACITY;
use crate::error::{Error, Result};

/// The kind of human-in-the-loop interaction an approval represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalType {
    /// The loop detector escalated and a human must decide how to proceed.
    LoopEscalation,
    /// The run needs the original goal clarified before continuing.
    GoalClarification,
    /// A step needs additional data only a human can supply.
    DataRequest,
    /// A safety-sensitive action needs explicit sign-off.
    SafetyCheck,
    /// Catch-all for workflow-defined approval checkpoints.
    GeneralApproval,
}

/// Lifecycle state of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Awaiting a reviewer decision.
    Pending,
    /// A reviewer decided; `decision` is populated.
    Decided,
    /// The deadline elapsed with no decision.
    Expired,
}

/// A human-in-the-loop approval request and its eventual resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    /// Unique identifier for this approval.
    pub approval_id: String,
    /// What kind of interaction this is.
    pub approval_type: ApprovalType,
    /// Human-readable prompt for the reviewer.
    pub message: String,
    /// The set of choices offered to the reviewer (empty = freeform).
    pub options: Vec<String>,
    /// The option the reviewer chose, once decided.
    pub decision: Option<String>,
    /// Free-text feedback accompanying the decision.
    pub feedback: Option<String>,
    /// Identifier of the reviewer who decided, once decided.
    pub reviewer_id: Option<String>,
    /// When the decision was recorded.
    pub decision_time: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    #[serde(skip, default = "default_status")]
    pub status: ApprovalStatus,
}

fn default_status() -> ApprovalStatus {
    ApprovalStatus::Pending
}

impl Approval {
    /// Create a new pending approval request.
    pub fn new(
        approval_id: impl Into<String>,
        approval_type: ApprovalType,
        message: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self {
            approval_id: approval_id.into(),
            approval_type,
            message: message.into(),
            options,
            decision: None,
            feedback: None,
            reviewer_id: None,
            decision_time: None,
            status: ApprovalStatus::Pending,
        }
    }
}

/// A reviewer's decision on a pending approval.
#[derive(Debug, Clone)]
pub struct Decision {
    /// The chosen option (or freeform text if `options` was empty).
    pub option: String,
    /// Identifier of the deciding reviewer.
    pub reviewer_id: Option<String>,
    /// Free-text feedback.
    pub feedback: Option<String>,
}

/// A pending approval awaiting a reviewer's decision.
pub struct PendingApproval {
    /// The approval request.
    pub approval: Approval,
    decision_tx: oneshot::Sender<Decision>,
}

impl PendingApproval {
    /// Record a decision and deliver it to the waiting caller. Returns
    /// `true` if delivered, `false` if the waiter already timed out.
    pub fn decide(self, decision: Decision) -> bool {
        let approval_id = self.approval.approval_id.clone();
        match self.decision_tx.send(decision) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(approval_id = %approval_id, "decision delivered after waiter gave up");
                false
            }
        }
    }

    /// Borrow the underlying approval request.
    pub fn approval(&self) -> &Approval {
        &self.approval
    }
}

/// Sender side of the approval channel: used by step handlers / the
/// scheduler to raise an approval and block until it is resolved.
pub struct ApprovalChannel {
    request_tx: mpsc::Sender<PendingApproval>,
}

impl Clone for ApprovalChannel {
    fn clone(&self) -> Self {
        Self {
            request_tx: self.request_tx.clone(),
        }
    }
}

impl ApprovalChannel {
    /// Create a linked `(ApprovalChannel, ApprovalReceiver)` pair.
    pub fn new() -> (Self, ApprovalReceiver) {
        let (request_tx, request_rx) = mpsc::channel(DEFAULT_MPSC_CHANNEL_CAPACITY);
        (Self { request_tx }, ApprovalReceiver { request_rx })
    }

    /// Raise `approval` and wait for a reviewer's decision, failing with
    /// `Error::ApprovalTimeout` if `deadline` elapses first. `deadline` of
    /// `None` waits indefinitely.
    pub async fn request_approval(
        &self,
        mut approval: Approval,
        deadline: Option<Duration>,
    ) -> Result<Approval> {
        let (decision_tx, decision_rx) = oneshot::channel();
        let approval_id = approval.approval_id.clone();
        let pending = PendingApproval {
            approval: approval.clone(),
            decision_tx,
        };

        self.request_tx
            .send(pending)
            .await
            .map_err(|_| Error::Internal(format!("approval channel closed for {approval_id}")))?;

        let decision = match deadline {
            Some(d) => tokio::time::timeout(d, decision_rx)
                .await
                .map_err(|_| Error::ApprovalTimeout {
                    approval_id: approval_id.clone(),
                })?
                .map_err(|_| {
                    Error::Internal(format!("decision channel dropped for {approval_id}"))
                })?,
            None => decision_rx
                .await
                .map_err(|_| Error::Internal(format!("decision channel dropped for {approval_id}")))?,
        };

        approval.decision = Some(decision.option);
        approval.feedback = decision.feedback;
        approval.reviewer_id = decision.reviewer_id;
        approval.decision_time = Some(Utc::now());
        approval.status = ApprovalStatus::Decided;
        Ok(approval)
    }
}

/// Receiver side of the approval channel: used by a reviewer UI/operator
/// loop to drain pending approvals and resolve them.
pub struct ApprovalReceiver {
    request_rx: mpsc::Receiver<PendingApproval>,
}

impl ApprovalReceiver {
    /// Wait for the next pending approval.
    pub async fn recv(&mut self) -> Option<PendingApproval> {
        self.request_rx.recv().await
    }

    /// Poll for a pending approval without waiting.
    pub fn try_recv(&mut self) -> Option<PendingApproval> {
        self.request_rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn approve_round_trip_delivers_decision() {
        let (channel, mut receiver) = ApprovalChannel::new();
        let approval = Approval::new(
            "appr-1",
            ApprovalType::SafetyCheck,
            "proceed?",
            vec!["yes".to_string(), "no".to_string()],
        );

        let requester = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request_approval(approval, None).await }
        });

        let pending = receiver.recv().await.unwrap();
        assert_eq!(pending.approval().approval_id, "appr-1");
        pending.decide(Decision {
            option: "yes".to_string(),
            reviewer_id: Some("reviewer-1".to_string()),
            feedback: None,
        });

        let resolved = requester.await.unwrap().unwrap();
        assert_eq!(resolved.decision, Some("yes".to_string()));
        assert_eq!(resolved.reviewer_id, Some("reviewer-1".to_string()));
        assert!(matches!(resolved.status, ApprovalStatus::Decided));
    }

    #[tokio::test]
    async fn timeout_without_decision_errors() {
        let (channel, mut receiver) = ApprovalChannel::new();
        let approval = Approval::new("appr-2", ApprovalType::GeneralApproval, "?", vec![]);

        let requester = tokio::spawn({
            let channel = channel.clone();
            async move {
                channel
                    .request_approval(approval, Some(Duration::from_millis(20)))
                    .await
            }
        });

        // Receive but never decide, letting the deadline elapse.
        let _pending = receiver.recv().await.unwrap();
        let err = requester.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ApprovalTimeout { approval_id } if approval_id == "appr-2"));
    }

    #[tokio::test]
    async fn decision_after_timeout_is_not_delivered() {
        let (channel, mut receiver) = ApprovalChannel::new();
        let approval = Approval::new("appr-3", ApprovalType::GeneralApproval, "?", vec![]);

        let requester = tokio::spawn({
            let channel = channel.clone();
            async move {
                channel
                    .request_approval(approval, Some(Duration::from_millis(10)))
                    .await
            }
        });

        let pending = receiver.recv().await.unwrap();
        assert!(requester.await.unwrap().is_err());
        let delivered = pending.decide(Decision {
            option: "late".to_string(),
            reviewer_id: None,
            feedback: None,
        });
        assert!(!delivered);
    }
}
