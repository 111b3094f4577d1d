// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Event Ledger (C2).
//!
//! Append-only, typed event log with a content-hash chain. `EventLedger` is
//! the only durable writer in the kernel; every other
//! component is derived from it via `project`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A single entry in a stream's hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Identifier of the stream (one per workflow instance) this belongs to.
    pub stream_id: String,
    /// Dense, strictly increasing sequence number within the stream.
    pub seq: u64,
    /// Wall-clock time the event was appended.
    pub timestamp: DateTime<Utc>,
    /// Event kind discriminator (e.g. "StepCompleted", "ApprovalRequested").
    pub kind: String,
    /// Event payload, canonical-JSON-hashed.
    pub payload: Value,
    /// Hash of the previous event in the chain ("" for the first event).
    pub prev_hash: String,
    /// `hash = H(prev_hash || kind || canonicalize(payload))`.
    pub hash: String,
}

/// Deterministically serialize a JSON value with sorted object keys.
///
/// `serde_json::Value`'s default map is already a `BTreeMap` in the
/// `preserve_order`-less configuration used here, so `to_string` already
/// sorts keys; this wrapper exists so call sites don't need to know that.
fn canonicalize(payload: &Value) -> String {
    serde_json::to_string(payload).unwrap_or_default()
}

fn compute_hash(prev_hash: &str, kind: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(kind.as_bytes());
    hasher.update(canonicalize(payload).as_bytes());
    hex::encode(hasher.finalize())
}

/// Append-only, in-memory event ledger keyed by stream id.
///
/// Appends to a given stream are serialized behind that stream's lock;
/// different streams never contend with each other.
#[derive(Debug, Default)]
pub struct EventLedger {
    streams: Mutex<HashMap<String, Arc<Mutex<Vec<Event>>>>>,
}

impl EventLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_lock(&self, stream_id: &str) -> Arc<Mutex<Vec<Event>>> {
        self.streams
            .lock()
            .entry(stream_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Append a batch of `(kind, payload)` pairs to a stream atomically,
    /// returning the resulting full `Event` records.
    pub fn append(&self, stream_id: &str, events: Vec<(String, Value)>) -> Result<Vec<Event>> {
        let lock = self.stream_lock(stream_id);
        let mut guard = lock.lock();

        let mut appended = Vec::with_capacity(events.len());
        for (kind, payload) in events {
            let seq = guard.len() as u64;
            let prev_hash = guard.last().map(|e| e.hash.clone()).unwrap_or_default();
            let hash = compute_hash(&prev_hash, &kind, &payload);
            let event = Event {
                stream_id: stream_id.to_string(),
                seq,
                timestamp: Utc::now(),
                kind,
                payload,
                prev_hash,
                hash,
            };
            guard.push(event.clone());
            appended.push(event);
        }
        Ok(appended)
    }

    /// Load the full event sequence for a stream, in append order.
    pub fn load(&self, stream_id: &str) -> Vec<Event> {
        self.stream_lock(stream_id).lock().clone()
    }

    /// Recompute the hash chain for a stream and compare against stored
    /// hashes. Returns `false` on the first mismatch (tampering or
    /// corruption), `true` for an empty or fully consistent stream.
    pub fn verify(&self, stream_id: &str) -> bool {
        let events = self.load(stream_id);
        let mut prev_hash = String::new();
        for event in &events {
            if event.prev_hash != prev_hash {
                return false;
            }
            let expected = compute_hash(&event.prev_hash, &event.kind, &event.payload);
            if expected != event.hash {
                return false;
            }
            prev_hash = event.hash.clone();
        }
        true
    }

    /// Fold a stream's events into a final state via `reducer`, starting
    /// from `init`. Identical streams always yield identical `project`
    /// results (required for memoization soundness).
    pub fn project<S, F>(&self, stream_id: &str, init: S, mut reducer: F) -> S
    where
        F: FnMut(S, &Event) -> S,
    {
        self.load(stream_id)
            .into_iter()
            .fold(init, |acc, e| reducer(acc, &e))
    }

    /// Convenience: verify and return an `IntegrityViolation` error if the
    /// chain is broken, identifying the first bad sequence number.
    pub fn verify_or_err(&self, stream_id: &str) -> Result<()> {
        let events = self.load(stream_id);
        let mut prev_hash = String::new();
        for event in &events {
            let expected_prev_ok = event.prev_hash == prev_hash;
            let expected_hash = compute_hash(&event.prev_hash, &event.kind, &event.payload);
            if !expected_prev_ok || expected_hash != event.hash {
                return Err(Error::IntegrityViolation {
                    stream_id: stream_id.to_string(),
                    seq: event.seq,
                });
            }
            prev_hash = event.hash.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_is_dense_and_increasing() {
        let ledger = EventLedger::new();
        let events = ledger
            .append(
                "wf-1",
                vec![
                    ("A".to_string(), json!({"x": 1})),
                    ("B".to_string(), json!({"x": 2})),
                ],
            )
            .unwrap();
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
        assert_eq!(events[1].prev_hash, events[0].hash);
    }

    #[test]
    fn verify_true_for_untampered_chain() {
        let ledger = EventLedger::new();
        ledger
            .append("wf-1", vec![("A".to_string(), json!({"x": 1}))])
            .unwrap();
        ledger
            .append("wf-1", vec![("B".to_string(), json!({"x": 2}))])
            .unwrap();
        assert!(ledger.verify("wf-1"));
    }

    #[test]
    fn tampering_flips_verify_to_false() {
        let ledger = EventLedger::new();
        ledger
            .append("wf-1", vec![("A".to_string(), json!({"x": 1}))])
            .unwrap();
        ledger
            .append("wf-1", vec![("B".to_string(), json!({"x": 2}))])
            .unwrap();

        // Tamper with the first event's payload directly.
        {
            let lock = ledger.stream_lock("wf-1");
            let mut guard = lock.lock();
            guard[0].payload = json!({"x": 999});
        }

        assert!(!ledger.verify("wf-1"));
    }

    #[test]
    fn project_is_deterministic_for_identical_streams() {
        let a = EventLedger::new();
        let b = EventLedger::new();
        for ledger in [&a, &b] {
            ledger
                .append("wf-1", vec![("Set".to_string(), json!({"x": 1}))])
                .unwrap();
            ledger
                .append("wf-1", vec![("Set".to_string(), json!({"x": 2}))])
                .unwrap();
        }

        let project = |ledger: &EventLedger| {
            ledger.project("wf-1", 0i64, |_acc, e| {
                e.payload.get("x").and_then(Value::as_i64).unwrap_or(0)
            })
        };

        assert_eq!(project(&a), project(&b));
    }

    #[test]
    fn empty_stream_verifies_true() {
        let ledger = EventLedger::new();
        assert!(ledger.verify("never-touched"));
    }

    #[test]
    fn concurrent_streams_are_independent() {
        let ledger = EventLedger::new();
        ledger
            .append("wf-1", vec![("A".to_string(), json!(1))])
            .unwrap();
        ledger
            .append("wf-2", vec![("A".to_string(), json!(1))])
            .unwrap();
        assert_eq!(ledger.load("wf-1").len(), 1);
        assert_eq!(ledger.load("wf-2").len(), 1);
    }
}
