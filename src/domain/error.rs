//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::AmountError;

/// Business rule violations raised by account behavior.
///
/// These are always recoverable: they are reported to the caller and
/// never retried automatically.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Initial balance for a new account must not be negative
    #[error("Initial balance must not be negative (got {0})")]
    NegativeInitialBalance(Decimal),

    /// Deposit/withdraw amounts must be strictly positive
    #[error("Amount must be positive (got {0})")]
    NonPositiveAmount(Decimal),

    /// Withdrawal exceeds the current balance
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    /// Account is closed and cannot process deposits or withdrawals
    #[error("Account is not active")]
    InactiveAccount,

    /// Close requested on an account that is already closed
    #[error("Account is already closed")]
    AlreadyClosed,

    /// Open requested on an aggregate that already has history
    #[error("Account is already opened")]
    AlreadyOpened,

    /// Amount failed structural validation (scale, magnitude)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            requested,
            available,
        }
    }

    /// Stable machine-readable code for transport layers
    pub fn code(&self) -> &'static str {
        match self {
            Self::NegativeInitialBalance(_) => "negative_initial_balance",
            Self::NonPositiveAmount(_) => "non_positive_amount",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InactiveAccount => "inactive_account",
            Self::AlreadyClosed => "already_closed",
            Self::AlreadyOpened => "already_opened",
            Self::InvalidAmount(_) => "invalid_amount",
        }
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::NotPositive(value) => Self::NonPositiveAmount(value),
            AmountError::Negative(value) => Self::NegativeInitialBalance(value),
            other => Self::InvalidAmount(other.to_string()),
        }
    }
}
