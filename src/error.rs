//! Error handling module
//!
//! Crate-level error taxonomy. Every rejected command maps to exactly one
//! of these kinds, with a human-readable message and a stable code for
//! transport layers.

use uuid::Uuid;

use crate::domain::DomainError;
use crate::event_store::EventStoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Command violates an account invariant; recoverable, never retried
    #[error(transparent)]
    Validation(#[from] DomainError),

    /// Version mismatch on append; retried internally up to a bound,
    /// surfaced only after retries exhaust (or immediately for a
    /// caller-supplied expected version)
    #[error("Concurrency conflict for account {account_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        account_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Command or query targets a non-existent account
    #[error("Account not found: {0}")]
    NotFound(Uuid),

    /// I/O error from the event store; fatal to the operation and never
    /// retried, since retrying a failed append could double-apply
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Stable machine-readable code for transport layers
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(domain) => domain.code(),
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage_failure",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl From<EventStoreError> for LedgerError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                account_id: aggregate_id,
                expected,
                actual,
            },
            other => Self::Storage(other.to_string()),
        }
    }
}
