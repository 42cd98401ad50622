//! Command definitions
//!
//! Commands represent intentions to change account state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::AccountEvent;

/// Commands accepted by the ledger core.
///
/// `expected_version` lets a caller carry its own optimistic concurrency
/// check: when set, the command fails immediately on a version mismatch
/// instead of being retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum AccountCommand {
    /// Open a new account; a fresh account ID is generated by the handler
    OpenAccount {
        holder_name: String,
        initial_balance: Decimal,
    },

    /// Deposit funds into an existing account
    Deposit {
        account_id: Uuid,
        amount: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected_version: Option<i64>,
    },

    /// Withdraw funds from an existing account
    Withdraw {
        account_id: Uuid,
        amount: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected_version: Option<i64>,
    },

    /// Close an existing account
    CloseAccount {
        account_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected_version: Option<i64>,
    },
}

impl AccountCommand {
    /// The aggregate this command targets, if it already exists
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            AccountCommand::OpenAccount { .. } => None,
            AccountCommand::Deposit { account_id, .. } => Some(*account_id),
            AccountCommand::Withdraw { account_id, .. } => Some(*account_id),
            AccountCommand::CloseAccount { account_id, .. } => Some(*account_id),
        }
    }

    /// Caller-supplied optimistic concurrency check, if any
    pub fn expected_version(&self) -> Option<i64> {
        match self {
            AccountCommand::OpenAccount { .. } => None,
            AccountCommand::Deposit {
                expected_version, ..
            }
            | AccountCommand::Withdraw {
                expected_version, ..
            }
            | AccountCommand::CloseAccount {
                expected_version, ..
            } => *expected_version,
        }
    }
}

/// Result of a successfully handled command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Target account (freshly generated for OpenAccount)
    pub account_id: Uuid,

    /// Aggregate version after the append
    pub new_version: i64,

    /// The events that were appended
    pub events: Vec<AccountEvent>,
}
