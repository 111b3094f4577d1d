// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Condition Registry (C9).
//!
//! Named predicates referenced by `crate::graph` branch and loop-exit nodes.
//! Registration is last-write-wins so a workflow author
//! can hot-reload a predicate's implementation between runs without
//! invalidating graphs that reference it by id.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{Error, Result};

/// A boolean predicate over workflow state, addressable by id.
pub type Predicate = dyn Fn(&Value) -> bool + Send + Sync;

/// Concurrent map of predicate id -> predicate implementation.
#[derive(Default)]
pub struct ConditionRegistry {
    predicates: DashMap<String, Box<Predicate>>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionRegistry")
            .field("registered", &self.known_ids())
            .finish()
    }
}

impl ConditionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) the predicate for `id`. Last write wins.
    pub fn register(
        &self,
        id: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) {
        self.predicates.insert(id.into(), Box::new(predicate));
    }

    /// Remove a predicate, if present.
    pub fn unregister(&self, id: &str) {
        self.predicates.remove(id);
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &str) -> bool {
        self.predicates.contains_key(id)
    }

    /// Snapshot of every registered id, for `crate::graph` validation.
    pub fn known_ids(&self) -> HashSet<String> {
        self.predicates.iter().map(|e| e.key().clone()).collect()
    }

    /// Evaluate the predicate registered under `id` against `state`.
    pub fn evaluate(&self, id: &str, state: &Value) -> Result<bool> {
        let entry = self
            .predicates
            .get(id)
            .ok_or_else(|| Error::UnknownCondition(id.to_string()))?;
        Ok((entry.value())(state))
    }
}
