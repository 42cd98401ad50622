//! Domain Events
//!
//! Event definitions for Event Sourcing.
//! Events are immutable facts that have happened to an account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Account-related events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountEvent {
    /// Account was opened with an initial balance
    AccountOpened {
        account_id: Uuid,
        holder_name: String,
        initial_balance: Decimal,
        opened_at: DateTime<Utc>,
    },

    /// Funds were deposited (balance increased)
    FundsDeposited {
        account_id: Uuid,
        amount: Decimal,
        deposited_at: DateTime<Utc>,
    },

    /// Funds were withdrawn (balance decreased)
    FundsWithdrawn {
        account_id: Uuid,
        amount: Decimal,
        withdrawn_at: DateTime<Utc>,
    },

    /// Account was closed
    AccountClosed {
        account_id: Uuid,
        closed_at: DateTime<Utc>,
    },
}

impl AccountEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened { .. } => "AccountOpened",
            AccountEvent::FundsDeposited { .. } => "FundsDeposited",
            AccountEvent::FundsWithdrawn { .. } => "FundsWithdrawn",
            AccountEvent::AccountClosed { .. } => "AccountClosed",
        }
    }

    /// Get the account ID this event relates to
    pub fn account_id(&self) -> Uuid {
        match self {
            AccountEvent::AccountOpened { account_id, .. } => *account_id,
            AccountEvent::FundsDeposited { account_id, .. } => *account_id,
            AccountEvent::FundsWithdrawn { account_id, .. } => *account_id,
            AccountEvent::AccountClosed { account_id, .. } => *account_id,
        }
    }
}

/// An event that has not yet been appended to the store.
///
/// Carries the type tag and the serialized payload; the store assigns
/// identity, sequence number and global offset at append time.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl PendingEvent {
    /// Serialize a domain event into its pending form
    pub fn new<E: Serialize>(event_type: &str, event: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: event_type.to_string(),
            payload: serde_json::to_value(event)?,
        })
    }
}

impl TryFrom<&AccountEvent> for PendingEvent {
    type Error = serde_json::Error;

    fn try_from(event: &AccountEvent) -> Result<Self, Self::Error> {
        PendingEvent::new(event.event_type(), event)
    }
}

/// An event as recorded in the event store.
///
/// `sequence_number` is unique and gap-free per aggregate, starting at 1.
/// `global_offset` is monotonic across all aggregates and orders the
/// whole log for projection replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,
    pub global_offset: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Deserialize the payload back into a typed domain event
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
