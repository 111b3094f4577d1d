// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Centralized default constants for the orchestration kernel.
//!
//! Collecting magic numbers here keeps tuning knobs discoverable and keeps
//! `KernelConfig`'s `Default` impl (see `crate::config`) free of inline
//! literals.

use std::time::Duration;

/// Default bounded step-cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default progress-ledger detector window size.
pub const DEFAULT_LOOP_WINDOW: usize = 10;

/// Minimum repeated entries within the window to call `ExactRepetition`.
pub const DEFAULT_EXACT_REPETITION_K: usize = 2;

/// Default cosine-similarity threshold for `SemanticRepetition`.
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.85;

/// Minimum window length to detect an ABAB oscillation.
pub const DEFAULT_OSCILLATION_MIN_LEN: usize = 4;

/// Default Beta prior shape parameters.
pub const DEFAULT_PRIOR_ALPHA: f64 = 2.0;
pub const DEFAULT_PRIOR_BETA: f64 = 2.0;

/// Default Thompson-sampling confidence fallback threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Default retrieval `topK`.
pub const DEFAULT_RAG_TOP_K: usize = 5;

/// Default minimum relevance score.
pub const DEFAULT_RAG_MIN_RELEVANCE: f64 = 0.7;

/// Default mpsc channel capacity for approval/cancellation plumbing.
pub const DEFAULT_MPSC_CHANNEL_CAPACITY: usize = 64;

/// Default per-step handler timeout when none is supplied by the graph node.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Scarcity thresholds: remaining-fraction breakpoints.
pub const SCARCITY_ABUNDANT_THRESHOLD: f64 = 0.7;
pub const SCARCITY_NORMAL_THRESHOLD: f64 = 0.3;
pub const SCARCITY_SCARCE_THRESHOLD: f64 = 0.1;

/// Scarcity multipliers, in the same order as the thresholds above.
pub const SCARCITY_ABUNDANT_MULTIPLIER: f64 = 1.0;
pub const SCARCITY_NORMAL_MULTIPLIER: f64 = 0.8;
pub const SCARCITY_SCARCE_MULTIPLIER: f64 = 0.5;
pub const SCARCITY_CRITICAL_MULTIPLIER: f64 = 0.2;
