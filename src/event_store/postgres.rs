//! PostgreSQL Event Store
//!
//! Relational engine behind the `EventStore` trait.
//! Appends are transactional with an optimistic version check; the unique
//! `(aggregate_id, sequence_number)` constraint is the backstop for races
//! the in-transaction check cannot see.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{PendingEvent, RecordedEvent};

use super::{EventStore, EventStoreError};

/// Default capacity of the notification channel
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// PostgreSQL error code for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

type EventRow = (
    Uuid,
    Uuid,
    i64,
    i64,
    String,
    serde_json::Value,
    DateTime<Utc>,
);

fn row_to_event(row: EventRow) -> RecordedEvent {
    let (id, aggregate_id, sequence_number, global_offset, event_type, payload, recorded_at) = row;
    RecordedEvent {
        id,
        aggregate_id,
        sequence_number,
        global_offset,
        event_type,
        payload,
        recorded_at,
    }
}

/// PostgreSQL-backed event store
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
    notifier: broadcast::Sender<RecordedEvent>,
}

impl PgEventStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        let (notifier, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { pool, notifier }
    }

    /// Connect to the database and create a store
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the events table if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id UUID PRIMARY KEY,
                aggregate_id UUID NOT NULL,
                sequence_number BIGINT NOT NULL,
                global_offset BIGSERIAL NOT NULL,
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL,
                UNIQUE (aggregate_id, sequence_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_events_global_offset
            ON events (global_offset)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the current version of an aggregate inside a transaction
    async fn get_current_version(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<i64, EventStoreError> {
        let result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(sequence_number) FROM events WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await?
        .flatten();

        Ok(result.unwrap_or(0))
    }

    /// Re-read the persisted version outside a failed transaction,
    /// to report the actual version in a conflict error
    async fn read_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError> {
        let result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(sequence_number) FROM events WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        Ok(result.unwrap_or(0))
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => {
                db.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<PendingEvent>,
    ) -> Result<i64, EventStoreError> {
        if events.is_empty() {
            return Err(EventStoreError::EmptyAppend(aggregate_id));
        }

        let mut tx = self.pool.begin().await?;

        let current_version = self.get_current_version(&mut tx, aggregate_id).await?;
        if current_version != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let mut appended = Vec::with_capacity(events.len());

        for (i, pending) in events.into_iter().enumerate() {
            let event_id = Uuid::new_v4();
            let sequence_number = expected_version + i as i64 + 1;
            let recorded_at = Utc::now();

            let insert = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO events (
                    id, aggregate_id, sequence_number,
                    event_type, payload, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING global_offset
                "#,
            )
            .bind(event_id)
            .bind(aggregate_id)
            .bind(sequence_number)
            .bind(&pending.event_type)
            .bind(&pending.payload)
            .bind(recorded_at)
            .fetch_one(&mut *tx)
            .await;

            let global_offset = match insert {
                Ok(offset) => offset,
                Err(e) if Self::is_unique_violation(&e) => {
                    // Lost the race after our version check; report the
                    // committed version
                    drop(tx);
                    let actual = self.read_version(aggregate_id).await?;
                    return Err(EventStoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            appended.push(RecordedEvent {
                id: event_id,
                aggregate_id,
                sequence_number,
                global_offset,
                event_type: pending.event_type,
                payload: pending.payload,
                recorded_at,
            });
        }

        tx.commit().await?;

        let new_version = expected_version + appended.len() as i64;

        // Notify only after commit; a send error means no live subscribers
        for event in appended {
            let _ = self.notifier.send(event);
        }

        Ok(new_version)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, aggregate_id, sequence_number, global_offset,
                   event_type, payload, recorded_at
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_event).collect())
    }

    async fn load_events_since(
        &self,
        global_offset: i64,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, aggregate_id, sequence_number, global_offset,
                   event_type, payload, recorded_at
            FROM events
            WHERE global_offset > $1
            ORDER BY global_offset ASC
            "#,
        )
        .bind(global_offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_event).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordedEvent> {
        self.notifier.subscribe()
    }
}
