//! Event Store module
//!
//! The append-only event log is the single source of truth.
//! The `EventStore` trait is the persistence seam: the rest of the crate
//! depends only on this contract, not on a specific engine.

mod error;
mod memory;
mod postgres;

pub use error::EventStoreError;
pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{PendingEvent, RecordedEvent};

/// Append-only, ordered, per-aggregate event log.
///
/// `append` is the sole concurrency gate: command handling is effectively
/// serialized per aggregate by the version check, with no lock held during
/// business-rule validation.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically append a batch of events to one aggregate's stream.
    ///
    /// Succeeds only if the aggregate's current persisted version equals
    /// `expected_version`; otherwise fails with
    /// [`EventStoreError::ConcurrencyConflict`] and writes nothing.
    /// Returns the new version after the append.
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<PendingEvent>,
    ) -> Result<i64, EventStoreError>;

    /// Load the full event history of one aggregate, in ascending
    /// `sequence_number` order. Unknown aggregates yield an empty vec.
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<RecordedEvent>, EventStoreError>;

    /// Load all events with `global_offset` greater than the given offset,
    /// in ascending global append order across all aggregates.
    ///
    /// Used by projections for catch-up and rebuild.
    async fn load_events_since(
        &self,
        global_offset: i64,
    ) -> Result<Vec<RecordedEvent>, EventStoreError>;

    /// Subscribe to newly appended events.
    ///
    /// Delivery is best-effort per subscriber: a lagging receiver may miss
    /// events and must catch up via [`EventStore::load_events_since`].
    /// Combined with idempotent projection application this yields
    /// at-least-once processing.
    fn subscribe(&self) -> broadcast::Receiver<RecordedEvent>;
}
