// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Progress Ledger & Loop Detector (C5).
//!
//! The ledger is an append-only, chronologically ordered record of executor
//! actions. The detector classifies the trailing window into one of four
//! degenerate patterns, evaluated in a fixed priority order, and recommends a
//! recovery strategy. Detecting a loop never fails the run by itself — it
//! only produces a directive for the scheduler to apply on its next tick.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EXACT_REPETITION_K, DEFAULT_LOOP_WINDOW, DEFAULT_OSCILLATION_MIN_LEN,
    DEFAULT_SEMANTIC_THRESHOLD,
};

/// Lifecycle state of an executor at the time a progress entry was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    /// Actively doing work.
    Executing,
    /// Emitting a signal (e.g. requesting help, escalating).
    Signaling,
    /// Blocked waiting on something external.
    Waiting,
    /// Finished successfully.
    Completed,
    /// Finished with failure.
    Failed,
}

/// A single chronological record of an executor's action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Unique id for this entry.
    pub entry_id: String,
    /// Task this entry belongs to.
    pub task_id: String,
    /// Executor (agent) that produced this entry.
    pub executor_id: String,
    /// Action name (e.g. "generate", "retry", "review").
    pub action: String,
    /// Output produced, if any.
    pub output: Option<String>,
    /// Whether this action moved the task forward.
    pub progress_made: bool,
    /// Artifact identifiers produced alongside the output.
    pub artifacts: Vec<String>,
    /// When this entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// How long the action took.
    pub duration: Option<Duration>,
    /// Tokens consumed producing this entry.
    pub tokens_consumed: u64,
    /// An optional signal value (free-form).
    pub signal: Option<String>,
    /// Executor lifecycle state at the time of this entry.
    pub executor_state: ExecutorState,
    /// Embedding of `output`, used for semantic-repetition detection.
    /// `None` when no embedder is configured.
    pub output_embedding: Option<Vec<f32>>,
}

/// Normalize output text for exact-repetition comparison: trim and
/// lowercase so cosmetic whitespace/case differences don't defeat detection.
fn normalize(output: &str) -> String {
    output.trim().to_lowercase()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

/// The kind of degenerate pattern the detector found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    /// ≥k entries share an identical `(executorId, action, normalized(output))`.
    ExactRepetition,
    /// ≥2 pairs of outputs are semantically near-duplicate.
    SemanticRepetition,
    /// Strict ABAB executor alternation over ≥4 entries.
    Oscillation,
    /// No entry in the window made progress.
    NoProgress,
}

/// The recovery strategy the scheduler should apply on its next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Inject a variation constraint into step metadata.
    InjectVariation,
    /// Exclude recent executors from the next N candidate selections.
    ForceRotation {
        /// Executors to exclude.
        excluded: Vec<String>,
        /// How many subsequent picks to exclude them for.
        picks: u32,
    },
    /// Inject both oscillating sides' outputs as context.
    Synthesize {
        /// The two alternating executors.
        sides: (String, String),
    },
    /// Break the task down into smaller sub-tasks.
    Decompose,
    /// Raise a `LoopEscalation` approval (decomposition budget exhausted).
    Escalate,
}

/// A detector finding: which kind matched and what recovery follows.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Which pattern matched.
    pub kind: LoopKind,
    /// Recovery strategy to apply.
    pub recovery: RecoveryStrategy,
}

/// Tunables for the detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Trailing window size to evaluate.
    pub window_size: usize,
    /// Minimum repeated entries for `ExactRepetition`.
    pub exact_repetition_k: usize,
    /// Cosine similarity threshold for `SemanticRepetition`.
    pub semantic_threshold: f64,
    /// Minimum window length to consider `Oscillation`.
    pub oscillation_min_len: usize,
    /// Remaining decompose attempts before `NoProgress` escalates.
    pub decompose_budget: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_LOOP_WINDOW,
            exact_repetition_k: DEFAULT_EXACT_REPETITION_K,
            semantic_threshold: DEFAULT_SEMANTIC_THRESHOLD,
            oscillation_min_len: DEFAULT_OSCILLATION_MIN_LEN,
            decompose_budget: 1,
        }
    }
}

/// Append-only, chronologically ordered progress ledger for a single run.
#[derive(Debug, Default)]
pub struct ProgressLedger {
    entries: Vec<ProgressEntry>,
    decomposes_remaining: u32,
}

impl ProgressLedger {
    /// Create an empty ledger with the given decompose budget.
    pub fn new(decompose_budget: u32) -> Self {
        Self {
            entries: Vec::new(),
            decomposes_remaining: decompose_budget,
        }
    }

    /// Append a new progress entry.
    pub fn record(&mut self, entry: ProgressEntry) {
        self.entries.push(entry);
    }

    /// All entries recorded so far, in order.
    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }

    fn window(&self, size: usize) -> &[ProgressEntry] {
        let len = self.entries.len();
        let start = len.saturating_sub(size);
        &self.entries[start..]
    }

    /// Run the four detectors over the trailing window, in priority order,
    /// returning the first match.
    pub fn detect(&mut self, config: &DetectorConfig) -> Option<Detection> {
        let window = self.window(config.window_size).to_vec();
        if window.is_empty() {
            return None;
        }

        if let Some(d) = detect_exact_repetition(&window, config) {
            return Some(d);
        }
        if let Some(d) = detect_semantic_repetition(&window, config) {
            return Some(d);
        }
        if let Some(d) = detect_oscillation(&window, config) {
            return Some(d);
        }
        detect_no_progress(&window, config, &mut self.decomposes_remaining)
    }
}

fn detect_exact_repetition(
    window: &[ProgressEntry],
    config: &DetectorConfig,
) -> Option<Detection> {
    use std::collections::HashMap;
    let mut counts: HashMap<(String, String, String), usize> = HashMap::new();
    for e in window {
        let key = (
            e.executor_id.clone(),
            e.action.clone(),
            normalize(e.output.as_deref().unwrap_or("")),
        );
        *counts.entry(key).or_insert(0) += 1;
    }
    if counts.values().any(|&c| c >= config.exact_repetition_k) {
        return Some(Detection {
            kind: LoopKind::ExactRepetition,
            recovery: RecoveryStrategy::InjectVariation,
        });
    }
    None
}

fn detect_semantic_repetition(
    window: &[ProgressEntry],
    config: &DetectorConfig,
) -> Option<Detection> {
    let mut similar_pairs = 0;
    let mut excluded: Vec<String> = Vec::new();
    for i in 0..window.len() {
        for j in (i + 1)..window.len() {
            let (Some(a), Some(b)) = (&window[i].output_embedding, &window[j].output_embedding)
            else {
                continue;
            };
            if cosine_similarity(a, b) > config.semantic_threshold {
                similar_pairs += 1;
                for id in [&window[i].executor_id, &window[j].executor_id] {
                    if !excluded.contains(id) {
                        excluded.push(id.clone());
                    }
                }
            }
        }
    }
    if similar_pairs >= 2 {
        return Some(Detection {
            kind: LoopKind::SemanticRepetition,
            recovery: RecoveryStrategy::ForceRotation { excluded, picks: 3 },
        });
    }
    None
}

fn detect_oscillation(window: &[ProgressEntry], config: &DetectorConfig) -> Option<Detection> {
    if window.len() < config.oscillation_min_len {
        return None;
    }
    let tail = &window[window.len() - config.oscillation_min_len..];
    let executors: Vec<&str> = tail.iter().map(|e| e.executor_id.as_str()).collect();
    let a = executors[0];
    let b = executors.iter().find(|&&e| e != a).copied();
    let Some(b) = b else {
        return None;
    };
    let is_abab = executors
        .iter()
        .enumerate()
        .all(|(idx, &e)| if idx % 2 == 0 { e == a } else { e == b });
    if is_abab {
        return Some(Detection {
            kind: LoopKind::Oscillation,
            recovery: RecoveryStrategy::Synthesize {
                sides: (a.to_string(), b.to_string()),
            },
        });
    }
    None
}

fn detect_no_progress(
    window: &[ProgressEntry],
    _config: &DetectorConfig,
    decomposes_remaining: &mut u32,
) -> Option<Detection> {
    if window.iter().all(|e| !e.progress_made) {
        let recovery = if *decomposes_remaining > 0 {
            *decomposes_remaining -= 1;
            RecoveryStrategy::Decompose
        } else {
            RecoveryStrategy::Escalate
        };
        return Some(Detection {
            kind: LoopKind::NoProgress,
            recovery,
        });
    }
    None
}

/// Test/builder helper: construct a minimal entry with sane defaults.
pub fn entry(
    executor_id: &str,
    action: &str,
    output: Option<&str>,
    progress_made: bool,
) -> ProgressEntry {
    ProgressEntry {
        entry_id: uuid::Uuid::new_v4().to_string(),
        task_id: "task".to_string(),
        executor_id: executor_id.to_string(),
        action: action.to_string(),
        output: output.map(str::to_string),
        progress_made,
        artifacts: Vec::new(),
        timestamp: Utc::now(),
        duration: None,
        tokens_consumed: 0,
        signal: None,
        executor_state: ExecutorState::Completed,
        output_embedding: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_when_all_progress_and_no_duplicates() {
        let mut ledger = ProgressLedger::new(1);
        for i in 0..5 {
            ledger.record(entry("A", &format!("step{i}"), Some(&format!("out{i}")), true));
        }
        assert_eq!(ledger.detect(&DetectorConfig::default()), None);
    }

    #[test]
    fn exact_repetition_detected() {
        let mut ledger = ProgressLedger::new(1);
        for _ in 0..10 {
            ledger.record(entry("A", "retry", Some("same"), false));
        }
        let detection = ledger.detect(&DetectorConfig::default()).unwrap();
        assert_eq!(detection.kind, LoopKind::ExactRepetition);
        assert_eq!(detection.recovery, RecoveryStrategy::InjectVariation);
    }

    #[test]
    fn oscillation_detected_for_strict_abab() {
        let mut ledger = ProgressLedger::new(1);
        for i in 0..6 {
            let executor = if i % 2 == 0 { "A" } else { "B" };
            ledger.record(entry(executor, "step", Some(&format!("o{i}")), true));
        }
        let detection = ledger.detect(&DetectorConfig::default()).unwrap();
        assert_eq!(detection.kind, LoopKind::Oscillation);
    }

    #[test]
    fn no_progress_decomposes_then_escalates() {
        let mut ledger = ProgressLedger::new(1);
        for _ in 0..10 {
            ledger.record(entry("A", "try", Some("x"), false));
        }
        // First round of non-duplicate-looking failures would actually hit
        // ExactRepetition first since output/action repeat; vary them.
        let mut ledger = ProgressLedger::new(1);
        for i in 0..10 {
            ledger.record(entry("A", &format!("try{i}"), Some(&format!("x{i}")), false));
        }
        let d1 = ledger.detect(&DetectorConfig::default()).unwrap();
        assert_eq!(d1.kind, LoopKind::NoProgress);
        assert_eq!(d1.recovery, RecoveryStrategy::Decompose);

        for i in 10..20 {
            ledger.record(entry("A", &format!("try{i}"), Some(&format!("x{i}")), false));
        }
        let d2 = ledger.detect(&DetectorConfig::default()).unwrap();
        assert_eq!(d2.kind, LoopKind::NoProgress);
        assert_eq!(d2.recovery, RecoveryStrategy::Escalate);
    }

    #[test]
    fn semantic_repetition_detected_via_embeddings() {
        let mut ledger = ProgressLedger::new(1);
        let mut e1 = entry("A", "gen1", Some("hello world"), true);
        e1.output_embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut e2 = entry("B", "gen2", Some("hello world!"), true);
        e2.output_embedding = Some(vec![0.99, 0.01, 0.0]);
        let mut e3 = entry("C", "gen3", Some("totally different"), true);
        e3.output_embedding = Some(vec![0.0, 1.0, 0.0]);
        let mut e4 = entry("D", "gen4", Some("hello world again"), true);
        e4.output_embedding = Some(vec![0.98, 0.02, 0.0]);
        ledger.record(e1);
        ledger.record(e2);
        ledger.record(e3);
        ledger.record(e4);
        let detection = ledger.detect(&DetectorConfig::default()).unwrap();
        assert_eq!(detection.kind, LoopKind::SemanticRepetition);
    }

    #[test]
    fn priority_order_is_exact_then_semantic_then_oscillation_then_no_progress() {
        // Build a window that would match both ExactRepetition and
        // Oscillation; ExactRepetition must win.
        let mut ledger = ProgressLedger::new(1);
        for i in 0..6 {
            let executor = if i % 2 == 0 { "A" } else { "B" };
            ledger.record(entry(executor, "retry", Some("same"), false));
        }
        let detection = ledger.detect(&DetectorConfig::default()).unwrap();
        assert_eq!(detection.kind, LoopKind::ExactRepetition);
    }
}
