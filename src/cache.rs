// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Step Execution Cache (C3).
//!
//! Memoizes step outputs keyed by `(stepName, inputHash)`, with optional
//! per-entry TTL and a choice between an unbounded concurrent map and a
//! bounded LRU. Concurrent callers racing for the same key share a single
//! in-flight computation (single-flight) so a cache stampede never triggers
//! redundant LLM calls.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::constants::DEFAULT_CACHE_CAPACITY;
use crate::error::Result;

/// A stored cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The memoized step result.
    pub result: Value,
    /// Absolute expiry; `None` means the entry never expires.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

/// `inputHash = hex(sha256(canonicalJSON(input)))`.
pub fn compute_input_hash<T: Serialize>(input: &T) -> String {
    let canonical = serde_json::to_string(input).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the wire cache key `"{stepName}:{inputHash}"`.
pub fn cache_key(step_name: &str, input_hash: &str) -> String {
    format!("{step_name}:{input_hash}")
}

enum Backing {
    Unbounded(DashMap<String, CacheEntry>),
    Bounded(Mutex<LruCache<String, CacheEntry>>),
}

/// Step execution cache with single-flight coalescing.
pub struct StepExecutionCache {
    backing: Backing,
    in_flight: DashMap<String, Arc<OnceCell<std::result::Result<Value, String>>>>,
}

impl StepExecutionCache {
    /// Create an unbounded cache (a plain concurrent map, never evicts by size).
    pub fn unbounded() -> Self {
        Self {
            backing: Backing::Unbounded(DashMap::new()),
            in_flight: DashMap::new(),
        }
    }

    /// Create a bounded LRU cache with the given capacity.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1))
            .unwrap_or_else(|| std::num::NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap());
        Self {
            backing: Backing::Bounded(Mutex::new(LruCache::new(capacity))),
            in_flight: DashMap::new(),
        }
    }

    /// Attempt to read a cached result for `(stepName, inputHash)`. Reads
    /// past `expiresAt` miss (and are lazily evicted).
    pub fn try_get(&self, step_name: &str, input_hash: &str) -> Option<Value> {
        let key = cache_key(step_name, input_hash);
        match &self.backing {
            Backing::Unbounded(map) => {
                let expired = map.get(&key).is_some_and(|e| e.is_expired());
                if expired {
                    map.remove(&key);
                    return None;
                }
                map.get(&key).map(|e| e.result.clone())
            }
            Backing::Bounded(mutex) => {
                let mut guard = mutex.lock();
                if guard.peek(&key).is_some_and(CacheEntry::is_expired) {
                    guard.pop(&key);
                    return None;
                }
                guard.get(&key).map(|e| e.result.clone())
            }
        }
    }

    /// Store (overwriting any prior entry) a result with an optional TTL.
    pub fn put(&self, step_name: &str, input_hash: &str, result: Value, ttl: Option<Duration>) {
        let key = cache_key(step_name, input_hash);
        let entry = CacheEntry {
            result,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        match &self.backing {
            Backing::Unbounded(map) => {
                map.insert(key, entry);
            }
            Backing::Bounded(mutex) => {
                mutex.lock().put(key, entry);
            }
        }
    }

    /// Get a cached result, or compute it with `producer` if missing.
    ///
    /// At most one `producer` future runs per `(stepName, inputHash)` at a
    /// time: concurrent callers for the same key await the same in-flight
    /// computation instead of each invoking `producer`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        step_name: &str,
        input_hash: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(hit) = self.try_get(step_name, input_hash) {
            return Ok(hit);
        }

        let key = cache_key(step_name, input_hash);
        let cell = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async move { producer().await.map_err(|e| e.to_string()) })
            .await
            .clone();

        // Only the producer's success is worth caching; a shared failure is
        // not memoized so the next caller gets a fresh attempt.
        if let Ok(value) = &result {
            self.put(step_name, input_hash, value.clone(), ttl);
        }
        self.in_flight.remove(&key);

        result.map_err(crate::error::Error::Internal)
    }
}
