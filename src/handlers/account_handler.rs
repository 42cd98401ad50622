//! Command Handler
//!
//! Orchestrates the load-decide-append cycle for account commands.
//! Optimistic concurrency is the correctness mechanism: no lock is held
//! during validation, and a conflicting append triggers a bounded retry
//! of the whole cycle.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::aggregate::{Account, Aggregate};
use crate::domain::{AccountEvent, Amount, PendingEvent};
use crate::error::{LedgerError, LedgerResult};
use crate::event_store::EventStore;

use super::{AccountCommand, CommandOutcome};

/// Default bound on load-decide-append retries after a conflict
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between retries (grows linearly per attempt)
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Handler for account commands
pub struct CommandHandler {
    store: Arc<dyn EventStore>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl CommandHandler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Create a handler with the retry policy from a `Config`
    pub fn with_config(store: Arc<dyn EventStore>, config: &crate::Config) -> Self {
        Self::new(store).with_retry_policy(config.max_append_retries, config.retry_backoff)
    }

    /// Override the retry bound and backoff
    pub fn with_retry_policy(mut self, max_retries: u32, retry_backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    /// Handle a command: load and rebuild the target aggregate, invoke its
    /// behavior, and append the emitted events.
    ///
    /// A concurrency conflict against a handler-observed version is retried
    /// up to the configured bound. A conflict against a caller-supplied
    /// `expected_version` surfaces immediately: that is the caller's own
    /// optimistic check failing.
    pub async fn handle(&self, command: AccountCommand) -> LedgerResult<CommandOutcome> {
        let caller_pinned = command.expected_version().is_some();
        let attempts = self.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.try_handle(&command).await {
                Err(LedgerError::ConcurrencyConflict { account_id, .. })
                    if !caller_pinned && attempt < attempts =>
                {
                    let delay = self.retry_backoff * attempt;
                    tracing::warn!(
                        %account_id,
                        attempt,
                        max_attempts = attempts,
                        "Concurrency conflict, retrying command"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// One load-decide-append cycle
    async fn try_handle(&self, command: &AccountCommand) -> LedgerResult<CommandOutcome> {
        match command {
            AccountCommand::OpenAccount {
                holder_name,
                initial_balance,
            } => {
                let account_id = Uuid::new_v4();
                let event =
                    Account::default().open(account_id, holder_name.clone(), *initial_balance)?;
                self.append(account_id, 0, event).await
            }

            AccountCommand::Deposit {
                account_id,
                amount,
                expected_version,
            } => {
                let amount = Amount::new(*amount)
                    .map_err(crate::domain::DomainError::from)?;
                let account = self.load_account(*account_id).await?;
                self.check_caller_version(&account, *expected_version)?;

                let event = account.deposit(&amount)?;
                self.append(*account_id, account.version(), event).await
            }

            AccountCommand::Withdraw {
                account_id,
                amount,
                expected_version,
            } => {
                let amount = Amount::new(*amount)
                    .map_err(crate::domain::DomainError::from)?;
                let account = self.load_account(*account_id).await?;
                self.check_caller_version(&account, *expected_version)?;

                let event = account.withdraw(&amount)?;
                self.append(*account_id, account.version(), event).await
            }

            AccountCommand::CloseAccount {
                account_id,
                expected_version,
            } => {
                let account = self.load_account(*account_id).await?;
                self.check_caller_version(&account, *expected_version)?;

                let event = account.close()?;
                self.append(*account_id, account.version(), event).await
            }
        }
    }

    /// Rebuild an account from its full event history
    async fn load_account(&self, account_id: Uuid) -> LedgerResult<Account> {
        let recorded = self.store.load_events(account_id).await?;
        if recorded.is_empty() {
            return Err(LedgerError::NotFound(account_id));
        }

        let mut account = Account::default();
        for event in recorded {
            let decoded: AccountEvent = event
                .decode()
                .map_err(crate::event_store::EventStoreError::from)?;
            account = account.apply(decoded);
        }

        Ok(account)
    }

    fn check_caller_version(
        &self,
        account: &Account,
        expected_version: Option<i64>,
    ) -> LedgerResult<()> {
        if let Some(expected) = expected_version {
            if expected != account.version() {
                return Err(LedgerError::ConcurrencyConflict {
                    account_id: account.id(),
                    expected,
                    actual: account.version(),
                });
            }
        }
        Ok(())
    }

    async fn append(
        &self,
        account_id: Uuid,
        expected_version: i64,
        event: AccountEvent,
    ) -> LedgerResult<CommandOutcome> {
        let pending =
            PendingEvent::try_from(&event).map_err(crate::event_store::EventStoreError::from)?;

        let new_version = self
            .store
            .append(account_id, expected_version, vec![pending])
            .await?;

        tracing::debug!(
            %account_id,
            new_version,
            event_type = event.event_type(),
            "Command accepted"
        );

        Ok(CommandOutcome {
            account_id,
            new_version,
            events: vec![event],
        })
    }
}
