// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Budget Guard (C6).
//!
//! Tracks multi-resource consumption against declared limits, classifies
//! remaining headroom into a scarcity tier per resource, and exposes an
//! admission check the scheduler consults before dispatching a step. The
//! minimum scarcity multiplier across all resources feeds `crate::belief`'s
//! Thompson selection as a demand-shaping signal.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::constants::{
    SCARCITY_ABUNDANT_MULTIPLIER, SCARCITY_ABUNDANT_THRESHOLD, SCARCITY_CRITICAL_MULTIPLIER,
    SCARCITY_NORMAL_MULTIPLIER, SCARCITY_NORMAL_THRESHOLD, SCARCITY_SCARCE_MULTIPLIER,
    SCARCITY_SCARCE_THRESHOLD,
};

/// A resource the budget tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Number of steps executed.
    Steps,
    /// LLM tokens consumed.
    Tokens,
    /// Step handler invocations.
    Executions,
    /// Tool calls made.
    ToolCalls,
    /// Wall-clock time elapsed since run start.
    WallTime,
}

/// Scarcity tier for a resource, derived from its remaining fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScarcityTier {
    /// Remaining fraction > 0.7.
    Abundant,
    /// 0.3 < remaining <= 0.7.
    Normal,
    /// 0.1 < remaining <= 0.3.
    Scarce,
    /// 0 <= remaining <= 0.1.
    Critical,
    /// remaining < 0 (over limit).
    Blocked,
}

impl ScarcityTier {
    /// Classify a remaining fraction into a tier.
    pub fn from_remaining_fraction(r: f64) -> Self {
        if r < 0.0 {
            ScarcityTier::Blocked
        } else if r > SCARCITY_ABUNDANT_THRESHOLD {
            ScarcityTier::Abundant
        } else if r > SCARCITY_NORMAL_THRESHOLD {
            ScarcityTier::Normal
        } else if r > SCARCITY_SCARCE_THRESHOLD {
            ScarcityTier::Scarce
        } else {
            ScarcityTier::Critical
        }
    }

    /// The score multiplier associated with this tier.
    pub fn multiplier(&self) -> f64 {
        match self {
            ScarcityTier::Abundant => SCARCITY_ABUNDANT_MULTIPLIER,
            ScarcityTier::Normal => SCARCITY_NORMAL_MULTIPLIER,
            ScarcityTier::Scarce => SCARCITY_SCARCE_MULTIPLIER,
            ScarcityTier::Critical => SCARCITY_CRITICAL_MULTIPLIER,
            ScarcityTier::Blocked => 0.0,
        }
    }
}

/// Result of a budget admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Proceed; plenty of headroom remains.
    Success,
    /// Proceed, but headroom is getting tight.
    Warning(String),
    /// Do not proceed; the resource would be exceeded.
    Blocked(String),
}

/// Multi-resource budget tracker for a single run.
#[derive(Debug)]
pub struct Budget {
    limits: HashMap<ResourceType, f64>,
    consumed: HashMap<ResourceType, f64>,
    run_start: Instant,
}

impl Budget {
    /// Create a budget from resource limits. `WallTime`'s limit is seconds.
    pub fn new(limits: HashMap<ResourceType, f64>) -> Self {
        Self {
            limits,
            consumed: HashMap::new(),
            run_start: Instant::now(),
        }
    }

    fn consumed_of(&self, resource: ResourceType) -> f64 {
        if resource == ResourceType::WallTime {
            self.run_start.elapsed().as_secs_f64()
        } else {
            *self.consumed.get(&resource).unwrap_or(&0.0)
        }
    }

    /// Remaining fraction for a resource; 1.0 if the resource has no limit
    /// declared (treated as unconstrained / always abundant).
    pub fn remaining_fraction(&self, resource: ResourceType) -> f64 {
        match self.limits.get(&resource) {
            None => 1.0,
            Some(limit) if *limit <= 0.0 => f64::MIN,
            Some(limit) => 1.0 - self.consumed_of(resource) / limit,
        }
    }

    /// Scarcity tier for a single resource.
    pub fn tier(&self, resource: ResourceType) -> ScarcityTier {
        ScarcityTier::from_remaining_fraction(self.remaining_fraction(resource))
    }

    /// The minimum multiplier across every declared resource — the
    /// effective scarcity factor exposed to Thompson selection.
    pub fn effective_scarcity_multiplier(&self) -> f64 {
        self.limits
            .keys()
            .map(|r| self.tier(*r).multiplier())
            .fold(1.0, f64::min)
    }

    /// Check whether `proposed_cost` of `resource` can be admitted without
    /// exceeding its limit.
    pub fn check(&self, resource: ResourceType, proposed_cost: f64) -> Admission {
        let Some(limit) = self.limits.get(&resource).copied() else {
            return Admission::Success;
        };
        let projected = self.consumed_of(resource) + proposed_cost;
        if projected > limit {
            return Admission::Blocked(format!(
                "{resource:?} exhausted: {projected} > limit {limit}"
            ));
        }
        let remaining = 1.0 - projected / limit;
        match ScarcityTier::from_remaining_fraction(remaining) {
            ScarcityTier::Scarce | ScarcityTier::Critical => {
                Admission::Warning(format!("{resource:?} running low: {remaining:.2} remaining"))
            }
            _ => Admission::Success,
        }
    }

    /// Record actual consumption of `resource` (post-step accounting for
    /// non-WallTime resources; WallTime accrues automatically).
    pub fn consume(&mut self, resource: ResourceType, amount: f64) {
        if resource == ResourceType::WallTime {
            return;
        }
        *self.consumed.entry(resource).or_insert(0.0) += amount;
    }

    /// Elapsed wall-clock time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.run_start.elapsed()
    }
}
