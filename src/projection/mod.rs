//! Projection module
//!
//! CQRS read side: read models derived by consuming the event log.
//! Projections own their storage and can be rebuilt at any time by
//! replaying the full log.

mod account_summary;
mod engine;

pub use account_summary::{AccountSummary, AccountSummaryProjection};
pub use engine::ProjectionEngine;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::RecordedEvent;
use crate::event_store::EventStoreError;

/// A read model fed by the event stream.
///
/// `on_event` must be idempotent: delivery is at-least-once, so the same
/// event may arrive more than once. Live notification does not guarantee
/// per-aggregate order either, so an implementation must refuse an event
/// that skips ahead of its applied watermark (`ProjectionError::OutOfOrder`)
/// instead of applying it; the engine then replays the gap from the log.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Name for logging and diagnostics
    fn name(&self) -> &'static str;

    /// Apply one event to the read model
    async fn on_event(&self, event: &RecordedEvent) -> Result<(), ProjectionError>;

    /// Discard all read-model state (precedes a full replay)
    async fn truncate(&self) -> Result<(), ProjectionError>;
}

/// Projection errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event store error: {0}")]
    Store(String),

    /// An event arrived ahead of its predecessors; the read model refuses
    /// it so the missing events can be replayed from the log
    #[error("Out-of-order event for aggregate {aggregate_id}: expected sequence {expected}, got {got}")]
    OutOfOrder {
        aggregate_id: Uuid,
        expected: i64,
        got: i64,
    },

    /// An event references an account the read model has never seen open
    #[error("Event for unknown account {0}; rebuild required")]
    UnknownAccount(Uuid),
}

impl From<EventStoreError> for ProjectionError {
    fn from(err: EventStoreError) -> Self {
        Self::Store(err.to_string())
    }
}
