// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Event-store contract.
//!
//! `crate::event::EventLedger` is an in-process, non-durable hash-chained
//! log; this trait is the seam a durable backend (e.g. a database-backed
//! store) would implement to persist and replay the same event stream
//! across process restarts. `InMemoryEventStore` mirrors `EventLedger`'s
//! semantics for tests that want to exercise the trait boundary directly.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::Event;

/// A durable, appendable, hash-chained event log keyed by stream id.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `(kind, payload)` pairs to `stream_id`, returning the
    /// resulting events with sequence numbers and hashes populated.
    async fn append(&self, stream_id: &str, events: Vec<(String, Value)>) -> Result<Vec<Event>>;

    /// Load the full event history for `stream_id`, in sequence order.
    async fn load(&self, stream_id: &str) -> Result<Vec<Event>>;

    /// Subscribe to newly appended events on `stream_id`, if the backend
    /// supports live tailing. The default implementation reports that no
    /// subscription is available.
    async fn subscribe(&self, _stream_id: &str) -> Result<Option<broadcast::Receiver<Event>>> {
        Ok(None)
    }
}

/// An in-memory `EventStore` double backed by `crate::event::EventLedger`'s
/// hashing scheme, additionally broadcasting each append for `subscribe`.
pub struct InMemoryEventStore {
    ledger: crate::event::EventLedger,
    subscribers: Mutex<HashMap<String, broadcast::Sender<Event>>>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            ledger: crate::event::EventLedger::new(),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn sender_for(&self, stream_id: &str) -> broadcast::Sender<Event> {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.entry(stream_id.to_string())
            .or_insert_with(|| broadcast::channel(crate::constants::DEFAULT_MPSC_CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream_id: &str, events: Vec<(String, Value)>) -> Result<Vec<Event>> {
        let appended = self.ledger.append(stream_id, events)?;
        let sender = self.sender_for(stream_id);
        for event in &appended {
            // No active subscribers is not an error; the event is simply dropped.
            let _ = sender.send(event.clone());
        }
        Ok(appended)
    }

    async fn load(&self, stream_id: &str) -> Result<Vec<Event>> {
        Ok(self.ledger.load(stream_id))
    }

    async fn subscribe(&self, stream_id: &str) -> Result<Option<broadcast::Receiver<Event>>> {
        Ok(Some(self.sender_for(stream_id).subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_then_load_round_trips() {
        let store = InMemoryEventStore::new();
        store
            .append("wf-1", vec![("started".to_string(), json!({}))])
            .await
            .unwrap();
        let loaded = store.load("wf-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].kind, "started");
    }

    #[tokio::test]
    async fn subscriber_receives_appended_events() {
        let store = InMemoryEventStore::new();
        let mut rx = store.subscribe("wf-1").await.unwrap().unwrap();
        store
            .append("wf-1", vec![("started".to_string(), json!({}))])
            .await
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, "started");
    }

    #[tokio::test]
    async fn independent_streams_do_not_cross_subscribe() {
        let store = InMemoryEventStore::new();
        let mut rx_a = store.subscribe("a").await.unwrap().unwrap();
        store
            .append("b", vec![("x".to_string(), json!({}))])
            .await
            .unwrap();
        assert!(rx_a.try_recv().is_err());
    }
}
