//! In-memory event store for resumable agent streams.
//!
//! Each stream is an append-only, totally ordered event log with a
//! monotonic id counter. A client that last saw id `k` reconnects with
//! `after_id = k` and receives only subsequent events, ending in a
//! terminal `done` or `error`. Streams idle past the TTL are evicted.
//!
//! The store is shared by every agent in the process; all operations are
//! atomic behind one mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::agent::events::AgentEvent;

/// Default idle TTL for streams (5 minutes).
pub const DEFAULT_STREAM_TTL: Duration = Duration::from_secs(300);

/// Stream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Running,
    Complete,
    Failed,
    Unknown,
}

/// One stored event with its stable, per-stream id.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredEvent {
    pub id: u64,
    pub event: AgentEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("stream '{0}' is already terminal")]
    StreamClosed(String),
}

struct StreamRecord {
    events: Vec<StoredEvent>,
    status: StreamStatus,
    failure_reason: Option<String>,
    next_id: u64,
    last_touched: Instant,
}

impl StreamRecord {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            status: StreamStatus::Running,
            failure_reason: None,
            next_id: 1,
            last_touched: Instant::now(),
        }
    }
}

/// Append/read/mark-complete event log, keyed by stream id.
pub struct EventStore {
    streams: Mutex<HashMap<String, StreamRecord>>,
    ttl: Duration,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_TTL)
    }
}

impl EventStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Append an event, assigning the next monotonic id. Creates the
    /// stream on first append; rejects appends to terminal streams.
    pub fn append(&self, stream_id: &str, event: AgentEvent) -> Result<u64, EventStoreError> {
        let mut streams = self.streams.lock().expect("event store poisoned");
        let record = streams
            .entry(stream_id.to_string())
            .or_insert_with(StreamRecord::new);

        if record.status != StreamStatus::Running {
            return Err(EventStoreError::StreamClosed(stream_id.to_string()));
        }

        let id = record.next_id;
        record.next_id += 1;
        record.events.push(StoredEvent { id, event });
        record.last_touched = Instant::now();
        Ok(id)
    }

    /// Events with `id > after_id`, in order, at most `max_count`.
    /// Unknown streams read as empty.
    pub fn read(
        &self,
        stream_id: &str,
        after_id: Option<u64>,
        max_count: usize,
    ) -> Vec<StoredEvent> {
        let mut streams = self.streams.lock().expect("event store poisoned");
        let Some(record) = streams.get_mut(stream_id) else {
            return Vec::new();
        };
        record.last_touched = Instant::now();

        let after = after_id.unwrap_or(0);
        record
            .events
            .iter()
            .filter(|e| e.id > after)
            .take(max_count)
            .cloned()
            .collect()
    }

    pub fn status(&self, stream_id: &str) -> StreamStatus {
        let streams = self.streams.lock().expect("event store poisoned");
        streams
            .get(stream_id)
            .map(|r| r.status)
            .unwrap_or(StreamStatus::Unknown)
    }

    /// Failure reason recorded by `mark_failed`, if any.
    pub fn failure_reason(&self, stream_id: &str) -> Option<String> {
        let streams = self.streams.lock().expect("event store poisoned");
        streams
            .get(stream_id)
            .and_then(|r| r.failure_reason.clone())
    }

    pub fn mark_complete(&self, stream_id: &str) {
        self.finish(stream_id, StreamStatus::Complete, None);
    }

    pub fn mark_failed(&self, stream_id: &str, reason: impl Into<String>) {
        self.finish(stream_id, StreamStatus::Failed, Some(reason.into()));
    }

    fn finish(&self, stream_id: &str, status: StreamStatus, reason: Option<String>) {
        let mut streams = self.streams.lock().expect("event store poisoned");
        match streams.get_mut(stream_id) {
            Some(record) => {
                record.status = status;
                record.failure_reason = reason;
                record.last_touched = Instant::now();
            }
            None => warn!(stream_id, "marking unknown stream"),
        }
    }

    /// Evict streams idle longer than the TTL. Returns how many were
    /// removed. Also invoked periodically by [`EventStore::spawn_sweeper`].
    pub fn sweep(&self) -> usize {
        let mut streams = self.streams.lock().expect("event store poisoned");
        let ttl = self.ttl;
        let before = streams.len();
        streams.retain(|_, record| record.last_touched.elapsed() <= ttl);
        let evicted = before - streams.len();
        if evicted > 0 {
            debug!(evicted, "swept expired streams");
        }
        evicted
    }

    /// Run the TTL sweeper on an interval until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.sweep();
            }
        })
    }
}
