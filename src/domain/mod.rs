//! Domain module
//!
//! Core domain types and business logic.

pub mod amount;
pub mod error;
pub mod events;

pub use amount::{Amount, AmountError, Balance};
pub use error::DomainError;
pub use events::{AccountEvent, PendingEvent, RecordedEvent};
