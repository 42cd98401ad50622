//! In-Memory Event Store
//!
//! In-process engine behind the `EventStore` trait. Used by the test suite
//! and by embedding hosts that do not need durability. Per-aggregate streams
//! and the global log live under a single lock so an append is observed
//! atomically by both read paths.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::domain::{PendingEvent, RecordedEvent};

use super::{EventStore, EventStoreError};

/// Default capacity of the notification channel
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Log {
    /// Per-aggregate streams, ordered by sequence number
    streams: HashMap<Uuid, Vec<RecordedEvent>>,

    /// Global log, ordered by append; `global_offset` = index + 1
    all: Vec<RecordedEvent>,
}

/// In-memory event store
#[derive(Debug)]
pub struct MemoryEventStore {
    log: RwLock<Log>,
    notifier: broadcast::Sender<RecordedEvent>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (notifier, _) = broadcast::channel(capacity);
        Self {
            log: RwLock::new(Log::default()),
            notifier,
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<PendingEvent>,
    ) -> Result<i64, EventStoreError> {
        if events.is_empty() {
            return Err(EventStoreError::EmptyAppend(aggregate_id));
        }

        let appended = {
            let mut log = self.log.write().await;

            let stream = log.streams.entry(aggregate_id).or_default();
            let current_version = stream.len() as i64;

            if current_version != expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual: current_version,
                });
            }

            let mut appended = Vec::with_capacity(events.len());
            let base_offset = log.all.len() as i64;

            for (i, pending) in events.into_iter().enumerate() {
                appended.push(RecordedEvent {
                    id: Uuid::new_v4(),
                    aggregate_id,
                    sequence_number: expected_version + i as i64 + 1,
                    global_offset: base_offset + i as i64 + 1,
                    event_type: pending.event_type,
                    payload: pending.payload,
                    recorded_at: Utc::now(),
                });
            }

            log.streams
                .entry(aggregate_id)
                .or_default()
                .extend(appended.iter().cloned());
            log.all.extend(appended.iter().cloned());

            appended
        };

        let new_version = appended
            .last()
            .map(|e| e.sequence_number)
            .unwrap_or(expected_version);

        // Notify after the write lock is released. A send error only means
        // there are no subscribers right now; projections recover through
        // load_events_since in that case.
        for event in appended {
            let _ = self.notifier.send(event);
        }

        Ok(new_version)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let log = self.log.read().await;
        Ok(log
            .streams
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_events_since(
        &self,
        global_offset: i64,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let log = self.log.read().await;
        let skip = global_offset.max(0) as usize;
        Ok(log.all.iter().skip(skip).cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordedEvent> {
        self.notifier.subscribe()
    }
}
