//! Command Handlers module
//!
//! CQRS write side: commands are validated against aggregate state rebuilt
//! from the event log, and accepted commands append new events.

mod account_handler;
mod commands;

pub use account_handler::CommandHandler;
pub use commands::{AccountCommand, CommandOutcome};
