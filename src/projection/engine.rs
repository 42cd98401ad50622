//! Projection Engine
//!
//! Single logical consumer of the event stream. Fans events out to the
//! registered projections, tracks the last applied global offset, and can
//! rebuild every read model from offset 0.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::RecordedEvent;
use crate::event_store::EventStore;

use super::{Projection, ProjectionError};

/// Drives one or more projections from the event log
pub struct ProjectionEngine {
    store: Arc<dyn EventStore>,
    projections: Vec<Arc<dyn Projection>>,

    /// Highest global offset applied so far
    last_offset: AtomicI64,
}

impl ProjectionEngine {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            projections: Vec::new(),
            last_offset: AtomicI64::new(0),
        }
    }

    /// Register a projection to be fed by this engine
    pub fn register(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projections.push(projection);
        self
    }

    /// Last global offset this engine has applied
    pub fn last_offset(&self) -> i64 {
        self.last_offset.load(Ordering::Acquire)
    }

    /// Apply one event to every registered projection.
    ///
    /// Safe to call with duplicates; projections are idempotent.
    pub async fn on_event(&self, event: &RecordedEvent) -> Result<(), ProjectionError> {
        for projection in &self.projections {
            projection.on_event(event).await?;
        }

        self.last_offset
            .fetch_max(event.global_offset, Ordering::AcqRel);
        Ok(())
    }

    /// Replay everything after the tracked offset.
    ///
    /// Returns the number of events applied.
    pub async fn catch_up(&self) -> Result<usize, ProjectionError> {
        let events = self.store.load_events_since(self.last_offset()).await?;
        let count = events.len();

        for event in &events {
            self.on_event(event).await?;
        }

        if count > 0 {
            tracing::debug!(count, "Projection catch-up applied events");
        }
        Ok(count)
    }

    /// Truncate every projection and replay the entire event log from
    /// offset 0. Used for schema changes or corruption recovery.
    pub async fn rebuild_all(&self) -> Result<usize, ProjectionError> {
        for projection in &self.projections {
            tracing::info!(projection = projection.name(), "Truncating for rebuild");
            projection.truncate().await?;
        }

        self.last_offset.store(0, Ordering::Release);
        self.catch_up().await
    }

    /// Consume the store's notification channel until it closes.
    ///
    /// A lagging receiver (missed notifications) falls back to catch-up
    /// replay from the tracked offset, and so does any failed live update:
    /// the failed event did not advance the offset, so replaying the log
    /// from there re-delivers it together with anything it arrived ahead
    /// of. A live event that raced with a catch-up is deduplicated by the
    /// projections themselves.
    pub async fn run(&self, mut receiver: broadcast::Receiver<RecordedEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.on_event(&event).await {
                        tracing::warn!(
                            aggregate_id = %event.aggregate_id,
                            sequence_number = event.sequence_number,
                            "Live projection update failed, replaying from log: {}",
                            e
                        );
                        if let Err(e) = self.catch_up().await {
                            tracing::error!("Projection catch-up failed: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Projection consumer lagged, catching up");
                    if let Err(e) = self.catch_up().await {
                        tracing::error!("Projection catch-up failed: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event notification channel closed, stopping consumer");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountEvent, PendingEvent};
    use crate::event_store::MemoryEventStore;
    use crate::projection::AccountSummaryProjection;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    async fn seed_scenario(store: &MemoryEventStore) -> Uuid {
        let account_id = Uuid::new_v4();
        let open = AccountEvent::AccountOpened {
            account_id,
            holder_name: "Jane".to_string(),
            initial_balance: dec!(100),
            opened_at: Utc::now(),
        };
        let deposit = AccountEvent::FundsDeposited {
            account_id,
            amount: dec!(50),
            deposited_at: Utc::now(),
        };
        let withdraw = AccountEvent::FundsWithdrawn {
            account_id,
            amount: dec!(30),
            withdrawn_at: Utc::now(),
        };

        store
            .append(account_id, 0, vec![PendingEvent::try_from(&open).unwrap()])
            .await
            .unwrap();
        store
            .append(
                account_id,
                1,
                vec![PendingEvent::try_from(&deposit).unwrap()],
            )
            .await
            .unwrap();
        store
            .append(
                account_id,
                2,
                vec![PendingEvent::try_from(&withdraw).unwrap()],
            )
            .await
            .unwrap();

        account_id
    }

    #[tokio::test]
    async fn test_catch_up_applies_backlog() {
        let store = Arc::new(MemoryEventStore::new());
        let account_id = seed_scenario(&store).await;

        let summaries = Arc::new(AccountSummaryProjection::new());
        let engine = ProjectionEngine::new(store).register(summaries.clone());

        let applied = engine.catch_up().await.unwrap();
        assert_eq!(applied, 3);
        assert_eq!(engine.last_offset(), 3);

        let summary = summaries.get(account_id).await.unwrap();
        assert_eq!(summary.balance, dec!(120));

        // Nothing new to apply
        assert_eq!(engine.catch_up().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_event_refused_then_repaired_by_catch_up() {
        let store = Arc::new(MemoryEventStore::new());
        let account_id = seed_scenario(&store).await;
        let events = store.load_events(account_id).await.unwrap();

        let summaries = Arc::new(AccountSummaryProjection::new());
        let engine = ProjectionEngine::new(store).register(summaries.clone());

        engine.on_event(&events[0]).await.unwrap();
        assert_eq!(engine.last_offset(), 1);

        // The withdrawal arrives before the deposit. The engine must not
        // advance past it, or the deposit would never be replayed.
        let result = engine.on_event(&events[2]).await;
        assert!(matches!(result, Err(ProjectionError::OutOfOrder { .. })));
        assert_eq!(engine.last_offset(), 1);

        // Replaying from the tracked offset repairs the gap
        assert_eq!(engine.catch_up().await.unwrap(), 2);

        // The late deposit is now a duplicate
        engine.on_event(&events[1]).await.unwrap();

        let summary = summaries.get(account_id).await.unwrap();
        assert_eq!(summary.balance, dec!(120));
        assert_eq!(summary.version, 3);
    }

    #[tokio::test]
    async fn test_run_recovers_from_reordered_live_delivery() {
        let store = Arc::new(MemoryEventStore::new());
        let account_id = seed_scenario(&store).await;
        let events = store.load_events(account_id).await.unwrap();

        let summaries = Arc::new(AccountSummaryProjection::new());
        let engine = Arc::new(ProjectionEngine::new(store).register(summaries.clone()));

        // Drive the consumer with a channel we control, delivering the
        // deposit and the withdrawal swapped
        let (tx, rx) = broadcast::channel(8);
        let consumer = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(rx).await }
        });

        tx.send(events[0].clone()).unwrap();
        tx.send(events[2].clone()).unwrap();
        tx.send(events[1].clone()).unwrap();
        drop(tx);

        consumer.await.unwrap();

        let summary = summaries.get(account_id).await.unwrap();
        assert_eq!(summary.balance, dec!(120));
        assert_eq!(summary.version, 3);
        assert_eq!(engine.last_offset(), 3);
    }

    #[tokio::test]
    async fn test_rebuild_all_replays_from_zero() {
        let store = Arc::new(MemoryEventStore::new());
        let account_id = seed_scenario(&store).await;

        let summaries = Arc::new(AccountSummaryProjection::new());
        let engine = ProjectionEngine::new(store).register(summaries.clone());

        engine.catch_up().await.unwrap();
        let before = summaries.get(account_id).await.unwrap();

        let applied = engine.rebuild_all().await.unwrap();
        assert_eq!(applied, 3);

        let after = summaries.get(account_id).await.unwrap();
        assert_eq!(before.balance, after.balance);
        assert_eq!(after.balance, dec!(120));
        assert_eq!(after.version, 3);
    }
}
