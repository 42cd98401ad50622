//! Account Summary Projection
//!
//! Denormalized per-account view for queries. This is one interpretation
//! of the event stream; other projections may coexist over the same log.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::AccountStatus;
use crate::domain::{AccountEvent, RecordedEvent};

use super::{Projection, ProjectionError};

/// Read-optimized account record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: Uuid,
    pub holder_name: String,
    pub balance: Decimal,
    pub status: AccountStatus,

    /// Last applied sequence number; the idempotency watermark
    pub version: i64,
    pub last_updated: DateTime<Utc>,
}

/// In-memory account summary read model
#[derive(Debug, Default)]
pub struct AccountSummaryProjection {
    accounts: RwLock<HashMap<Uuid, AccountSummary>>,
}

impl AccountSummaryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one account summary
    pub async fn get(&self, account_id: Uuid) -> Option<AccountSummary> {
        self.accounts.read().await.get(&account_id).cloned()
    }

    /// Snapshot of all account summaries, unordered
    pub async fn all(&self) -> Vec<AccountSummary> {
        self.accounts.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl Projection for AccountSummaryProjection {
    fn name(&self) -> &'static str {
        "account_summary"
    }

    async fn on_event(&self, event: &RecordedEvent) -> Result<(), ProjectionError> {
        let domain: AccountEvent = event.decode()?;
        let mut accounts = self.accounts.write().await;

        let watermark = accounts
            .get(&event.aggregate_id)
            .map(|summary| summary.version)
            .unwrap_or(0);

        // Duplicate delivery: anything at or below the applied watermark
        // has already been folded in
        if event.sequence_number <= watermark {
            tracing::debug!(
                projection = self.name(),
                aggregate_id = %event.aggregate_id,
                sequence_number = event.sequence_number,
                "Skipping duplicate event"
            );
            return Ok(());
        }

        // A gap means an earlier event has not arrived yet. Refuse it:
        // applying it would drop the missing event permanently, while an
        // error lets the engine replay from its last applied offset.
        if event.sequence_number > watermark + 1 {
            return Err(ProjectionError::OutOfOrder {
                aggregate_id: event.aggregate_id,
                expected: watermark + 1,
                got: event.sequence_number,
            });
        }

        match domain {
            AccountEvent::AccountOpened {
                account_id,
                holder_name,
                initial_balance,
                ..
            } => {
                accounts.insert(
                    account_id,
                    AccountSummary {
                        account_id,
                        holder_name,
                        balance: initial_balance,
                        status: AccountStatus::Active,
                        version: event.sequence_number,
                        last_updated: event.recorded_at,
                    },
                );
            }

            AccountEvent::FundsDeposited {
                account_id, amount, ..
            } => {
                let summary = accounts
                    .get_mut(&account_id)
                    .ok_or(ProjectionError::UnknownAccount(account_id))?;
                summary.balance += amount;
                summary.version = event.sequence_number;
                summary.last_updated = event.recorded_at;
            }

            AccountEvent::FundsWithdrawn {
                account_id, amount, ..
            } => {
                let summary = accounts
                    .get_mut(&account_id)
                    .ok_or(ProjectionError::UnknownAccount(account_id))?;
                summary.balance -= amount;
                summary.version = event.sequence_number;
                summary.last_updated = event.recorded_at;
            }

            AccountEvent::AccountClosed { account_id, .. } => {
                let summary = accounts
                    .get_mut(&account_id)
                    .ok_or(ProjectionError::UnknownAccount(account_id))?;
                summary.status = AccountStatus::Closed;
                summary.version = event.sequence_number;
                summary.last_updated = event.recorded_at;
            }
        }

        Ok(())
    }

    async fn truncate(&self) -> Result<(), ProjectionError> {
        self.accounts.write().await.clear();
        Ok(())
    }
}
