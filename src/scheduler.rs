// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Scheduler (C8).
//!
//! Drives a single workflow instance tick-by-tick: one logical executor per
//! run, integrating the state reducer, event
//! ledger, step cache, belief store, progress ledger, budget guard,
//! condition registry, and approval coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::approval::{Approval, ApprovalChannel, ApprovalType};
use crate::belief::{select_agent, AgentCandidate, BeliefStore};
use crate::budget::{Admission, Budget, ResourceType};
use crate::cache::{compute_input_hash, StepExecutionCache};
use crate::condition::ConditionRegistry;
use crate::error::{Error, Result, StepFailureKind};
use crate::graph::{NodeKind, WorkflowGraph};
use crate::progress::{DetectorConfig, ProgressEntry, ProgressLedger, RecoveryStrategy};
use crate::state::{reduce, Delta, FieldSchema, WorkflowState};
use crate::store::EventStore;
use crate::task::TaskFeatures;
use crate::workflow::{RunHandle, RunStatus};

/// Cooperative cancellation signal threaded through step handlers.
pub type CancelSignal = watch::Receiver<bool>;

/// Per-tick metadata a loop-recovery strategy may inject before a step runs.
#[derive(Debug, Clone, Default)]
pub struct StepConstraints {
    /// Ask the handler to produce a materially different output than its
    /// last attempt (set by `RecoveryStrategy::InjectVariation`).
    pub vary: bool,
    /// Agent ids the next `select_agent` call must exclude (set by
    /// `RecoveryStrategy::ForceRotation`).
    pub excluded_agents: Vec<String>,
    /// The two executors whose oscillation triggered a synthesis request;
    /// handlers may fold both sides' last outputs into their prompt.
    pub synthesize_sides: Option<(String, String)>,
}

/// Everything a step handler needs to do its work for one tick.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The graph node id being executed.
    pub step_name: String,
    /// Recovery constraints carried over from the loop detector, if any.
    pub constraints: StepConstraints,
    /// The agent selected for this step, if agent dispatch is configured.
    pub selected_agent: Option<String>,
}

/// What a step handler produces.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// State update to reduce in via C1.
    pub delta: Delta,
    /// Additional domain events to append alongside the scheduler's own.
    pub events: Vec<(String, Value)>,
    /// Progress-ledger entry this step's execution produced.
    pub progress_entry: Option<ProgressEntry>,
    /// Actual resource cost incurred, consumed against the budget on
    /// success. Need not match the node's declared `estimated_cost`.
    pub delta_cost: HashMap<ResourceType, f64>,
}

/// A unit of work dispatched to a `Step` node.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Execute this step against `state`, honoring `cancel`.
    async fn execute(
        &self,
        state: &WorkflowState,
        ctx: &StepContext,
        cancel: CancelSignal,
    ) -> Result<StepResult>;
}

/// Tunables and collaborators the scheduler needs to drive a run.
pub struct Scheduler {
    graph: WorkflowGraph,
    schema: FieldSchema,
    conditions: Arc<ConditionRegistry>,
    handlers: HashMap<String, Arc<dyn StepHandler>>,
    cache: Arc<StepExecutionCache>,
    belief: Arc<BeliefStore>,
    approvals: ApprovalChannel,
    detector_config: DetectorConfig,
    confidence_threshold: Option<f64>,
    default_agent: Option<String>,
    max_step_retries: u32,
}

impl Scheduler {
    /// Assemble a scheduler from its collaborators. `approvals` is the
    /// sender half an operator-facing `ApprovalReceiver` drains.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: WorkflowGraph,
        schema: FieldSchema,
        conditions: Arc<ConditionRegistry>,
        handlers: HashMap<String, Arc<dyn StepHandler>>,
        cache: Arc<StepExecutionCache>,
        belief: Arc<BeliefStore>,
        approvals: ApprovalChannel,
        detector_config: DetectorConfig,
    ) -> Self {
        Self {
            graph,
            schema,
            conditions,
            handlers,
            cache,
            belief,
            approvals,
            detector_config,
            confidence_threshold: None,
            default_agent: None,
            max_step_retries: 1,
        }
    }

    /// Configure the Thompson-selection confidence fallback.
    #[must_use]
    pub fn with_confidence_fallback(
        mut self,
        threshold: f64,
        default_agent: impl Into<String>,
    ) -> Self {
        self.confidence_threshold = Some(threshold);
        self.default_agent = Some(default_agent.into());
        self
    }

    /// Configure the retry limit for `Recoverable` step failures.
    #[must_use]
    pub fn with_max_step_retries(mut self, max: u32) -> Self {
        self.max_step_retries = max;
        self
    }

    /// Drive `handle`'s run to completion (or a terminal suspension),
    /// returning the final handle and state.
    pub async fn run(
        &self,
        mut handle: RunHandle,
        mut state: WorkflowState,
        event_store: Arc<dyn EventStore>,
        mut budget: Budget,
        candidates: Vec<AgentCandidate>,
        task: Option<TaskFeatures>,
        mut cancel: CancelSignal,
    ) -> Result<(RunHandle, WorkflowState)> {
        let mut progress = ProgressLedger::new(self.detector_config.decompose_budget);
        let mut cursor = self
            .graph
            .entry_point()
            .ok_or_else(|| Error::ValidationFailed("no entry point set".to_string()))?
            .to_string();
        let mut pending_constraints = StepConstraints::default();
        let mut loop_iterations: HashMap<String, u32> = HashMap::new();

        loop {
            if *cancel.borrow() {
                event_store
                    .append(&handle.stream_id, vec![("Cancelled".to_string(), json!({}))])
                    .await?;
                handle.transition(RunStatus::Cancelled);
                return Ok((handle, state));
            }

            if let Some(detection) = progress.detect(&self.detector_config) {
                tracing::warn!(kind = ?detection.kind, "loop detector triggered recovery");
                match detection.recovery {
                    RecoveryStrategy::InjectVariation => {
                        pending_constraints.vary = true;
                    }
                    RecoveryStrategy::ForceRotation { excluded, .. } => {
                        pending_constraints.excluded_agents = excluded;
                    }
                    RecoveryStrategy::Synthesize { sides } => {
                        pending_constraints.synthesize_sides = Some(sides);
                    }
                    RecoveryStrategy::Decompose => {
                        event_store
                            .append(
                                &handle.stream_id,
                                vec![("LoopRecoveryDecompose".to_string(), json!({}))],
                            )
                            .await?;
                    }
                    RecoveryStrategy::Escalate => {
                        let approval = Approval::new(
                            uuid::Uuid::new_v4().to_string(),
                            ApprovalType::LoopEscalation,
                            "loop recovery exhausted its decompose budget",
                            vec!["abort".to_string(), "continue".to_string()],
                        );
                        event_store
                            .append(
                                &handle.stream_id,
                                vec![(
                                    "ApprovalRequested".to_string(),
                                    serde_json::to_value(&approval).unwrap_or(Value::Null),
                                )],
                            )
                            .await?;
                        match self.approvals.request_approval(approval, None).await {
                            Ok(decided) => {
                                event_store
                                    .append(
                                        &handle.stream_id,
                                        vec![(
                                            "ApprovalDecided".to_string(),
                                            serde_json::to_value(&decided).unwrap_or(Value::Null),
                                        )],
                                    )
                                    .await?;
                                if decided.decision.as_deref() == Some("abort") {
                                    handle.transition(RunStatus::Failed(
                                        "loop escalation aborted by reviewer".to_string(),
                                    ));
                                    return Ok((handle, state));
                                }
                            }
                            Err(Error::ApprovalTimeout { approval_id }) => {
                                handle.transition(RunStatus::Escalated);
                                event_store
                                    .append(
                                        &handle.stream_id,
                                        vec![(
                                            "ApprovalTimedOut".to_string(),
                                            json!({"approvalId": approval_id}),
                                        )],
                                    )
                                    .await?;
                                return Ok((handle, state));
                            }
                            Err(e) => return Err(e),
                        }
                    }
                }
            }

            let node = self
                .graph
                .node(&cursor)
                .ok_or_else(|| Error::Internal(format!("cursor '{cursor}' has no node")))?
                .clone();

            match node {
                NodeKind::Terminal => {
                    handle.transition(RunStatus::Completed);
                    return Ok((handle, state));
                }

                NodeKind::Step { handler_id, estimated_cost } => {
                    let outcome = self
                        .run_step(
                            &cursor,
                            &handler_id,
                            &state,
                            &mut budget,
                            &estimated_cost,
                            &candidates,
                            task.as_ref(),
                            std::mem::take(&mut pending_constraints),
                            cancel.clone(),
                        )
                        .await;

                    match outcome {
                        Ok((next_state, events, progress_entry)) => {
                            state = next_state;
                            if !events.is_empty() {
                                event_store.append(&handle.stream_id, events).await?;
                            }
                            if let Some(entry) = progress_entry {
                                progress.record(entry);
                            }
                        }
                        Err(Error::BudgetExhausted(reason)) => {
                            event_store
                                .append(
                                    &handle.stream_id,
                                    vec![("BudgetExhausted".to_string(), json!({"reason": reason.clone()}))],
                                )
                                .await?;
                            handle.transition(RunStatus::BudgetExhausted(reason));
                            return Ok((handle, state));
                        }
                        Err(Error::StepFailed { step, kind, message }) => {
                            event_store
                                .append(
                                    &handle.stream_id,
                                    vec![(
                                        "StepFailed".to_string(),
                                        json!({"step": step, "kind": format!("{kind:?}"), "message": message}),
                                    )],
                                )
                                .await?;
                            if kind == StepFailureKind::Fatal {
                                handle.transition(RunStatus::Failed(message));
                                return Ok((handle, state));
                            }
                            // Recoverable: the scheduler's own retry loop already
                            // exhausted `max_step_retries` inside `run_step`, so a
                            // Recoverable failure reaching here terminates too.
                            handle.transition(RunStatus::Failed(message));
                            return Ok((handle, state));
                        }
                        Err(e) => return Err(e),
                    }

                    cursor = self
                        .graph
                        .outgoing(&cursor)
                        .first()
                        .cloned()
                        .unwrap_or_else(|| crate::graph::END.to_string());
                }

                NodeKind::Branch { predicate_id, cases } => {
                    let state_json = serde_json::to_value(&state.fields).unwrap_or(Value::Null);
                    let result = self.conditions.evaluate(&predicate_id, &state_json)?;
                    let label = result.to_string();
                    cursor = cases
                        .iter()
                        .find(|(l, _)| *l == label)
                        .map(|(_, target)| target.clone())
                        .or_else(|| cases.first().map(|(_, t)| t.clone()))
                        .ok_or_else(|| {
                            Error::ValidationFailed(format!("branch '{cursor}' has no cases"))
                        })?;
                }

                NodeKind::Loop {
                    body,
                    exit_condition_id,
                    max_iterations,
                } => {
                    let iterations = loop_iterations.entry(cursor.clone()).or_insert(0);
                    let state_json = serde_json::to_value(&state.fields).unwrap_or(Value::Null);
                    let satisfied = self.conditions.evaluate(&exit_condition_id, &state_json)?;
                    let exceeded = *iterations >= max_iterations;
                    if exceeded && !satisfied {
                        tracing::warn!(node = %cursor, "loop exceeded maxIterations, exiting as satisfied");
                        event_store
                            .append(
                                &handle.stream_id,
                                vec![("LoopMaxIterationsExceeded".to_string(), json!({"node": cursor}))],
                            )
                            .await?;
                    }
                    if satisfied || exceeded {
                        cursor = self
                            .graph
                            .outgoing(&cursor)
                            .first()
                            .cloned()
                            .unwrap_or_else(|| crate::graph::END.to_string());
                    } else {
                        *iterations += 1;
                        cursor = body;
                    }
                }

                NodeKind::Fork { branches } => {
                    let join = self
                        .graph
                        .outgoing(&cursor)
                        .first()
                        .cloned()
                        .unwrap_or_else(|| crate::graph::END.to_string());

                    let mut branch_futures = Vec::with_capacity(branches.len());
                    for branch_start in &branches {
                        branch_futures.push(self.run_subpath(
                            branch_start.clone(),
                            join.clone(),
                            state.clone(),
                            cancel.clone(),
                        ));
                    }
                    let results = futures::future::join_all(branch_futures).await;

                    for result in results {
                        let (delta, _reached) = result?;
                        state = reduce(&state, &delta, &self.schema)?;
                    }

                    cursor = join;
                }

                NodeKind::Join { mode } => {
                    // Branches have already been merged when advancing past
                    // their Fork; a Join reached directly is a structural
                    // no-op (mode only matters for partial-completion
                    // semantics, which single-tick-at-a-time scheduling
                    // never produces here).
                    let _ = mode;
                    cursor = self
                        .graph
                        .outgoing(&cursor)
                        .first()
                        .cloned()
                        .unwrap_or_else(|| crate::graph::END.to_string());
                }

                NodeKind::Approval { approver_marker } => {
                    let approval = Approval::new(
                        uuid::Uuid::new_v4().to_string(),
                        ApprovalType::GeneralApproval,
                        format!("approval required at node '{cursor}' ({approver_marker})"),
                        vec![],
                    );
                    event_store
                        .append(
                            &handle.stream_id,
                            vec![(
                                "ApprovalRequested".to_string(),
                                serde_json::to_value(&approval).unwrap_or(Value::Null),
                            )],
                        )
                        .await?;
                    match self.approvals.request_approval(approval, None).await {
                        Ok(decided) => {
                            event_store
                                .append(
                                    &handle.stream_id,
                                    vec![(
                                        "ApprovalDecided".to_string(),
                                        serde_json::to_value(&decided).unwrap_or(Value::Null),
                                    )],
                                )
                                .await?;
                            let delta = Delta::new().with(
                                "__last_approval__",
                                serde_json::to_value(&decided).unwrap_or(Value::Null),
                            );
                            if self.schema.policy_of("__last_approval__").is_some() {
                                state = reduce(&state, &delta, &self.schema)?;
                            }
                            cursor = self
                                .graph
                                .outgoing(&cursor)
                                .first()
                                .cloned()
                                .unwrap_or_else(|| crate::graph::END.to_string());
                        }
                        Err(Error::ApprovalTimeout { approval_id }) => {
                            event_store
                                .append(
                                    &handle.stream_id,
                                    vec![(
                                        "ApprovalTimedOut".to_string(),
                                        json!({"approvalId": approval_id}),
                                    )],
                                )
                                .await?;
                            handle.transition(RunStatus::Escalated);
                            return Ok((handle, state));
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        node_id: &str,
        handler_id: &str,
        state: &WorkflowState,
        budget: &mut Budget,
        estimated_cost: &HashMap<ResourceType, f64>,
        candidates: &[AgentCandidate],
        task: Option<&TaskFeatures>,
        constraints: StepConstraints,
        cancel: CancelSignal,
    ) -> Result<(WorkflowState, Vec<(String, Value)>, Option<ProgressEntry>)> {
        let input_hash = compute_input_hash(&state.fields);

        if let Some(cached) = self.cache.try_get(node_id, &input_hash) {
            let delta: Delta = serde_json::from_value(cached).map_err(|e| {
                Error::Internal(format!("corrupt cache entry for '{node_id}': {e}"))
            })?;
            let next_state = reduce(state, &delta, &self.schema)?;
            return Ok((next_state, vec![], None));
        }

        // Every step counts against `Steps`; the node's own declared cost
        // covers whichever other resources (Tokens, ToolCalls, ...) it
        // projects to spend, admitted up front rather than discovered only
        // after the handler has already run.
        let mut projected_cost = estimated_cost.clone();
        projected_cost.entry(ResourceType::Steps).or_insert(1.0);
        for (resource, amount) in &projected_cost {
            match budget.check(*resource, *amount) {
                Admission::Blocked(reason) => return Err(Error::BudgetExhausted(reason)),
                Admission::Warning(reason) => {
                    tracing::warn!(node = %node_id, %reason, "budget warning")
                }
                Admission::Success => {}
            }
        }

        let selected_agent = if let Some(task) = task {
            if candidates.is_empty() {
                None
            } else {
                let eligible: Vec<AgentCandidate> = candidates
                    .iter()
                    .filter(|c| !constraints.excluded_agents.contains(&c.agent_id))
                    .cloned()
                    .collect();
                let mut rng = rand::thread_rng();
                let scarcity = budget.effective_scarcity_multiplier();
                let selection = select_agent(
                    &self.belief,
                    &eligible,
                    task,
                    scarcity,
                    self.confidence_threshold,
                    self.default_agent.as_deref(),
                    &mut rng,
                )?;
                Some(selection.agent_id)
            }
        } else {
            None
        };

        let handler = self
            .handlers
            .get(handler_id)
            .ok_or_else(|| Error::Internal(format!("no handler registered for '{handler_id}'")))?
            .clone();

        let ctx = StepContext {
            step_name: node_id.to_string(),
            constraints,
            selected_agent: selected_agent.clone(),
        };

        let mut attempt = 0;
        loop {
            match handler.execute(state, &ctx, cancel.clone()).await {
                Ok(result) => {
                    let next_state = reduce(state, &result.delta, &self.schema)?;
                    self.cache.put(
                        node_id,
                        &input_hash,
                        serde_json::to_value(&result.delta).unwrap_or(Value::Null),
                        None,
                    );
                    budget.consume(ResourceType::Steps, 1.0);
                    for (resource, amount) in &result.delta_cost {
                        budget.consume(*resource, *amount);
                    }
                    if let (Some(task), Some(agent_id)) = (task, &selected_agent) {
                        self.belief.update(agent_id, &task.category, true);
                    }
                    let mut events = result.events;
                    events.insert(
                        0,
                        (
                            "StepCompleted".to_string(),
                            json!({"node": node_id, "handler": handler_id}),
                        ),
                    );
                    return Ok((next_state, events, result.progress_entry));
                }
                Err(Error::StepFailed { step, kind, message }) => {
                    if let (Some(task), Some(agent_id)) = (task, &selected_agent) {
                        self.belief.update(agent_id, &task.category, false);
                    }
                    if kind == StepFailureKind::Recoverable && attempt < self.max_step_retries {
                        attempt += 1;
                        tracing::warn!(node = %node_id, attempt, "retrying recoverable step failure");
                        continue;
                    }
                    return Err(Error::StepFailed { step, kind, message });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Walk a sub-path (used for `Fork` branches) from `start` until
    /// reaching `stop_at` or a `Terminal`, accumulating a single combined
    /// delta. Only `Step` and `Branch` nodes are supported inside a forked
    /// branch; nested forks are rejected.
    async fn run_subpath(
        &self,
        start: String,
        stop_at: String,
        mut state: WorkflowState,
        cancel: CancelSignal,
    ) -> Result<(Delta, String)> {
        let mut cursor = start;
        let mut combined = Delta::new();

        loop {
            if cursor == stop_at {
                return Ok((combined, cursor));
            }
            let node = self
                .graph
                .node(&cursor)
                .ok_or_else(|| Error::Internal(format!("cursor '{cursor}' has no node")))?
                .clone();

            match node {
                NodeKind::Terminal => return Ok((combined, cursor)),
                NodeKind::Step { handler_id, .. } => {
                    let handler = self
                        .handlers
                        .get(&handler_id)
                        .ok_or_else(|| Error::Internal(format!("no handler for '{handler_id}'")))?
                        .clone();
                    let ctx = StepContext {
                        step_name: cursor.clone(),
                        constraints: StepConstraints::default(),
                        selected_agent: None,
                    };
                    let result = handler.execute(&state, &ctx, cancel.clone()).await?;
                    state = reduce(&state, &result.delta, &self.schema)?;
                    for (field, value) in result.delta.values {
                        combined = combined.with(field, value);
                    }
                    cursor = self
                        .graph
                        .outgoing(&cursor)
                        .first()
                        .cloned()
                        .unwrap_or_else(|| stop_at.clone());
                }
                NodeKind::Branch { predicate_id, cases } => {
                    let state_json = serde_json::to_value(&state.fields).unwrap_or(Value::Null);
                    let result = self.conditions.evaluate(&predicate_id, &state_json)?;
                    let label = result.to_string();
                    cursor = cases
                        .iter()
                        .find(|(l, _)| *l == label)
                        .map(|(_, target)| target.clone())
                        .or_else(|| cases.first().map(|(_, t)| t.clone()))
                        .unwrap_or_else(|| stop_at.clone());
                }
                _ => {
                    return Err(Error::ValidationFailed(
                        "forked branches may only contain Step/Branch nodes".to_string(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StepHandler for EchoHandler {
        async fn execute(
            &self,
            _state: &WorkflowState,
            _ctx: &StepContext,
            _cancel: CancelSignal,
        ) -> Result<StepResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StepResult {
                delta: Delta::new().with("done", json!(true)),
                ..Default::default()
            })
        }
    }

    fn straight_line_scheduler(calls: Arc<AtomicUsize>) -> Scheduler {
        let mut graph = WorkflowGraph::new();
        graph.add_node(
            "A",
            NodeKind::Step { handler_id: "echo".to_string(), estimated_cost: HashMap::new() },
        );
        graph.add_edge("A", crate::graph::END);
        graph.set_entry_point("A");

        let mut handlers: HashMap<String, Arc<dyn StepHandler>> = HashMap::new();
        handlers.insert("echo".to_string(), Arc::new(EchoHandler { calls }));

        let schema = FieldSchema::new().with_field("done", FieldPolicy::Replace);

        Scheduler::new(
            graph,
            schema,
            Arc::new(ConditionRegistry::new()),
            handlers,
            Arc::new(StepExecutionCache::unbounded()),
            Arc::new(BeliefStore::new()),
            ApprovalChannel::new().0,
            DetectorConfig::default(),
        )
    }

    #[tokio::test]
    async fn straight_line_run_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = straight_line_scheduler(calls.clone());
        let handle = RunHandle::new("wf-1");
        let state = WorkflowState::new("wf-1");
        let store: Arc<dyn EventStore> = Arc::new(crate::store::InMemoryEventStore::new());
        let budget = Budget::new(HashMap::new());
        let (_tx, rx) = watch::channel(false);

        let (handle, state) = scheduler
            .run(handle, state, store, budget, vec![], None, rx)
            .await
            .unwrap();

        assert_eq!(handle.status, RunStatus::Completed);
        assert_eq!(state.get::<bool>("done"), Some(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_before_first_tick_stops_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = straight_line_scheduler(calls.clone());
        let handle = RunHandle::new("wf-1");
        let state = WorkflowState::new("wf-1");
        let store: Arc<dyn EventStore> = Arc::new(crate::store::InMemoryEventStore::new());
        let budget = Budget::new(HashMap::new());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let (handle, _state) = scheduler
            .run(handle, state, store, budget, vec![], None, rx)
            .await
            .unwrap();

        assert_eq!(handle.status, RunStatus::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn budget_exhaustion_terminates_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = straight_line_scheduler(calls.clone());
        let handle = RunHandle::new("wf-1");
        let state = WorkflowState::new("wf-1");
        let store: Arc<dyn EventStore> = Arc::new(crate::store::InMemoryEventStore::new());
        let mut limits = HashMap::new();
        limits.insert(ResourceType::Steps, 0.0);
        let budget = Budget::new(limits);
        let (_tx, rx) = watch::channel(false);

        let (handle, _state) = scheduler
            .run(handle, state, store, budget, vec![], None, rx)
            .await
            .unwrap();

        assert!(matches!(handle.status, RunStatus::BudgetExhausted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
