//! ledger-core
//!
//! Event-sourced account ledger with CQRS read models.
//!
//! Account state exists only as a replayable sequence of immutable events;
//! the write side enforces invariants through optimistic concurrency at the
//! event store's append boundary, and the read side serves queries from
//! independently consistent projections. Transport, wire format and the
//! choice of persistence engine are left to the host process.

pub mod aggregate;
pub mod domain;
pub mod event_store;
pub mod handlers;
pub mod projection;
pub mod query;

pub mod config;
mod error;

pub use config::Config;
pub use error::{LedgerError, LedgerResult};
pub use aggregate::{Account, AccountStatus, Aggregate};
pub use domain::{AccountEvent, Amount, AmountError, Balance, DomainError, RecordedEvent};
pub use event_store::{EventStore, EventStoreError, MemoryEventStore, PgEventStore};
pub use handlers::{AccountCommand, CommandHandler, CommandOutcome};
pub use projection::{AccountSummary, AccountSummaryProjection, Projection, ProjectionEngine};
pub use query::{AccountFilter, QueryError, QueryService};

/// Initialize tracing/logging for host processes that don't bring their own
/// subscriber
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
