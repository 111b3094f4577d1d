// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Workflow Graph IR (C7).
//!
//! A graph of typed step nodes that a workflow author's fluent builder
//! compiles down to. The kernel consumes this IR directly — no code
//! generation is involved.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};

use crate::budget::ResourceType;
use crate::error::{Error, Result};

/// Reserved id for the implicit terminal node.
pub const END: &str = "__end__";

/// Join barrier semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinMode {
    /// Wait for every branch.
    All,
    /// Proceed once any one branch completes.
    Any,
    /// Proceed once `n` branches complete.
    Quorum(usize),
}

/// A single branch case: `(label, target node id)`.
pub type BranchCase = (String, String);

/// Node kinds in the workflow graph IR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// A unit of work dispatched to a step handler.
    Step {
        /// Identifier the scheduler uses to look up the handler.
        handler_id: String,
        /// Estimated per-resource cost, admitted against the budget before
        /// the handler is dispatched. Empty means the step only counts
        /// against `ResourceType::Steps`.
        #[serde(default)]
        estimated_cost: HashMap<ResourceType, f64>,
    },
    /// Evaluate a named predicate and branch on its result.
    Branch {
        /// Condition registry id to evaluate.
        predicate_id: String,
        /// Outcome label -> next node id.
        cases: Vec<BranchCase>,
    },
    /// Repeat `body` until `exit_condition_id` holds or `max_iterations` is hit.
    Loop {
        /// Entry node of the loop body.
        body: String,
        /// Condition registry id checked each iteration.
        exit_condition_id: String,
        /// Hard iteration cap; exceeding it exits as if satisfied (with a warning).
        max_iterations: u32,
    },
    /// Spawn concurrent child branches.
    Fork {
        /// Node ids to run concurrently.
        branches: Vec<String>,
    },
    /// Gate continuation on a fork's children per `mode`.
    Join {
        /// Barrier semantics.
        mode: JoinMode,
    },
    /// Suspend until an external decision is submitted.
    Approval {
        /// Marker identifying who must approve (free-form).
        approver_marker: String,
    },
    /// A run-ending node.
    Terminal,
}

/// A validation failure or warning report (kept structured so callers can
/// distinguish hard failures from informational notes).
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Hard failures — any entry here means the graph must not be compiled.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Whether the graph passed validation (no errors recorded).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The workflow graph IR: nodes, outgoing edges, and a single entry point.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    nodes: HashMap<String, NodeKind>,
    edges: HashMap<String, Vec<String>>,
    entry: Option<String>,
}

impl WorkflowGraph {
    /// Start an empty graph (with the reserved `END` terminal pre-registered).
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
        };
        graph.nodes.insert(END.to_string(), NodeKind::Terminal);
        graph
    }

    /// Register a node. Re-registering an id overwrites its kind.
    pub fn add_node(&mut self, id: impl Into<String>, kind: NodeKind) {
        self.nodes.insert(id.into(), kind);
    }

    /// Add a directed edge `from -> to`.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.entry(from.into()).or_default().push(to.into());
    }

    /// Declare the single entry point.
    pub fn set_entry_point(&mut self, id: impl Into<String>) {
        self.entry = Some(id.into());
    }

    /// Look up a node's kind.
    pub fn node(&self, id: &str) -> Option<&NodeKind> {
        self.nodes.get(id)
    }

    /// Outgoing targets for a node.
    pub fn outgoing(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The declared entry point, if set.
    pub fn entry_point(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    fn build_petgraph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut pg = DiGraph::new();
        let mut index_of = HashMap::new();
        for id in self.nodes.keys() {
            index_of.insert(id.clone(), pg.add_node(id.clone()));
        }
        for (from, targets) in &self.edges {
            if let Some(&from_idx) = index_of.get(from) {
                for to in targets {
                    if let Some(&to_idx) = index_of.get(to) {
                        pg.add_edge(from_idx, to_idx, ());
                    }
                }
            }
        }
        (pg, index_of)
    }

    /// Validate the graph against its structural invariants:
    /// every non-terminal has ≥1 outgoing edge; exactly one entry point;
    /// at least one terminal is reachable from the entry; every `Loop` has
    /// `maxIterations >= 1`; every referenced `predicateId` is registered
    /// in `known_predicates`.
    pub fn validate(&self, known_predicates: &HashSet<String>) -> ValidationReport {
        let mut report = ValidationReport::default();

        match &self.entry {
            None => report.errors.push("no entry point set".to_string()),
            Some(entry) if !self.nodes.contains_key(entry) => {
                report
                    .errors
                    .push(format!("entry point '{entry}' is not a registered node"));
            }
            _ => {}
        }

        for (id, kind) in &self.nodes {
            if !matches!(kind, NodeKind::Terminal) && self.outgoing(id).is_empty() {
                report
                    .errors
                    .push(format!("non-terminal node '{id}' has no outgoing edges"));
            }

            match kind {
                NodeKind::Branch { predicate_id, .. } => {
                    if !known_predicates.contains(predicate_id) {
                        report.errors.push(format!(
                            "branch node '{id}' references unregistered predicate '{predicate_id}'"
                        ));
                    }
                }
                NodeKind::Loop {
                    exit_condition_id,
                    max_iterations,
                    ..
                } => {
                    if *max_iterations < 1 {
                        report
                            .errors
                            .push(format!("loop node '{id}' has maxIterations < 1"));
                    }
                    if !known_predicates.contains(exit_condition_id) {
                        report.errors.push(format!(
                            "loop node '{id}' references unregistered predicate '{exit_condition_id}'"
                        ));
                    }
                }
                _ => {}
            }
        }

        if let Some(entry) = &self.entry {
            if self.nodes.contains_key(entry) {
                let (pg, index_of) = self.build_petgraph();
                if let Some(&start) = index_of.get(entry) {
                    let mut bfs = Bfs::new(&pg, start);
                    let mut reached_terminal = false;
                    while let Some(nx) = bfs.next(&pg) {
                        let id = &pg[nx];
                        if matches!(self.nodes.get(id), Some(NodeKind::Terminal)) {
                            reached_terminal = true;
                        }
                    }
                    if !reached_terminal {
                        report
                            .errors
                            .push("no terminal node reachable from entry point".to_string());
                    }
                }
            }
        }

        report
    }

    /// Validate and return `Err` on the first failure summary if invalid.
    pub fn compile(&self, known_predicates: &HashSet<String>) -> Result<()> {
        let report = self.validate(known_predicates);
        if report.is_valid() {
            Ok(())
        } else {
            Err(Error::ValidationFailed(report.errors.join("; ")))
        }
    }

    /// Breadth-first traversal of all node ids reachable from the entry
    /// point, for diagnostics and tests.
    pub fn reachable_from_entry(&self) -> HashSet<String> {
        let mut seen = HashSet::new();
        let Some(entry) = &self.entry else {
            return seen;
        };
        let mut queue = VecDeque::from([entry.clone()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for next in self.outgoing(&id) {
                queue.push_back(next.clone());
            }
        }
        seen
    }
}
