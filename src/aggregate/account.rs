//! Account Aggregate
//!
//! Account is the core aggregate of the ledger.
//! It applies events to maintain current state and generates events for
//! commands. State is derived from events, never directly mutated.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountEvent, Amount, Balance, DomainError};

use super::Aggregate;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Closed,
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Account Aggregate
///
/// A disposable value object: rebuilt by folding its event history inside
/// a command handling operation, then discarded. An account with version 0
/// has no history and is considered uninitialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: Uuid,
    holder_name: String,
    balance: Balance,
    status: AccountStatus,

    /// Last applied sequence number
    version: i64,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            holder_name: String::new(),
            balance: Balance::zero(),
            status: AccountStatus::Active,
            version: 0,
        }
    }
}

impl Account {
    /// Open a new account, generating the opening event.
    ///
    /// The account must be uninitialized and the initial balance must not
    /// be negative.
    pub fn open(
        &self,
        account_id: Uuid,
        holder_name: String,
        initial_balance: Decimal,
    ) -> Result<AccountEvent, DomainError> {
        if self.is_opened() {
            return Err(DomainError::AlreadyOpened);
        }

        if initial_balance < Decimal::ZERO {
            return Err(DomainError::NegativeInitialBalance(initial_balance));
        }

        // Structural validation (scale, magnitude)
        Balance::new(initial_balance).map_err(|e| DomainError::InvalidAmount(e.to_string()))?;

        Ok(AccountEvent::AccountOpened {
            account_id,
            holder_name,
            initial_balance,
            opened_at: Utc::now(),
        })
    }

    /// Deposit funds into the account
    pub fn deposit(&self, amount: &Amount) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        Ok(AccountEvent::FundsDeposited {
            account_id: self.id,
            amount: amount.value(),
            deposited_at: Utc::now(),
        })
    }

    /// Withdraw funds from the account
    pub fn withdraw(&self, amount: &Amount) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        if !self.balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_funds(
                amount.value(),
                self.balance.value(),
            ));
        }

        Ok(AccountEvent::FundsWithdrawn {
            account_id: self.id,
            amount: amount.value(),
            withdrawn_at: Utc::now(),
        })
    }

    /// Close the account
    pub fn close(&self) -> Result<AccountEvent, DomainError> {
        if self.status == AccountStatus::Closed {
            return Err(DomainError::AlreadyClosed);
        }

        Ok(AccountEvent::AccountClosed {
            account_id: self.id,
            closed_at: Utc::now(),
        })
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status != AccountStatus::Active {
            return Err(DomainError::InactiveAccount);
        }
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn holder_name(&self) -> &str {
        &self.holder_name
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Whether this aggregate has any history
    pub fn is_opened(&self) -> bool {
        self.version > 0
    }
}

impl Aggregate for Account {
    type Event = AccountEvent;

    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            AccountEvent::AccountOpened {
                account_id,
                holder_name,
                initial_balance,
                ..
            } => {
                self.id = account_id;
                self.holder_name = holder_name;
                self.status = AccountStatus::Active;
                self.balance = match Balance::new(initial_balance) {
                    Ok(balance) => balance,
                    Err(e) => {
                        tracing::error!(
                            "Invalid initial balance in AccountOpened event for account {}: {}",
                            account_id,
                            e
                        );
                        Balance::zero()
                    }
                };
            }

            AccountEvent::FundsDeposited { amount, .. } => {
                // Safely handle invalid amount in a stored event
                match Amount::new(amount) {
                    Ok(amt) => match self.balance.credit(&amt) {
                        Ok(new_balance) => self.balance = new_balance,
                        Err(e) => {
                            tracing::error!(
                                "Balance overflow during deposit replay for account {}: {}",
                                self.id,
                                e
                            );
                        }
                    },
                    Err(e) => {
                        tracing::error!(
                            "Invalid amount in FundsDeposited event for account {}: {}",
                            self.id,
                            e
                        );
                    }
                }
            }

            AccountEvent::FundsWithdrawn { amount, .. } => {
                match Amount::new(amount) {
                    Ok(amt) => match self.balance.debit(&amt) {
                        Ok(new_balance) => self.balance = new_balance,
                        Err(e) => {
                            tracing::error!(
                                "Balance underflow during withdrawal replay for account {}: {}",
                                self.id,
                                e
                            );
                        }
                    },
                    Err(e) => {
                        tracing::error!(
                            "Invalid amount in FundsWithdrawn event for account {}: {}",
                            self.id,
                            e
                        );
                    }
                }
            }

            AccountEvent::AccountClosed { .. } => {
                self.status = AccountStatus::Closed;
            }
        }

        self.version += 1;
        self
    }
}
