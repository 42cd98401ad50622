//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

/// Ledger core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bound on load-decide-append retries after a concurrency conflict
    pub max_append_retries: u32,

    /// Base delay between retries (grows linearly per attempt)
    pub retry_backoff: Duration,

    /// Capacity of the event notification channel
    pub channel_capacity: usize,

    /// Database connection URL (only needed for the Postgres engine)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_append_retries: 3,
            retry_backoff: Duration::from_millis(50),
            channel_capacity: 256,
            database_url: None,
            database_max_connections: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let max_append_retries = match env::var("LEDGER_MAX_APPEND_RETRIES") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("LEDGER_MAX_APPEND_RETRIES"))?,
            Err(_) => defaults.max_append_retries,
        };

        let retry_backoff = match env::var("LEDGER_RETRY_BACKOFF_MS") {
            Ok(value) => Duration::from_millis(
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("LEDGER_RETRY_BACKOFF_MS"))?,
            ),
            Err(_) => defaults.retry_backoff,
        };

        let channel_capacity = match env::var("LEDGER_CHANNEL_CAPACITY") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("LEDGER_CHANNEL_CAPACITY"))?,
            Err(_) => defaults.channel_capacity,
        };

        let database_url = env::var("DATABASE_URL").ok();

        let database_max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?,
            Err(_) => defaults.database_max_connections,
        };

        Ok(Self {
            max_append_retries,
            retry_backoff,
            channel_capacity,
            database_url,
            database_max_connections,
        })
    }

    /// The database URL, or an error if the Postgres engine was requested
    /// without one configured
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingEnv("DATABASE_URL"))
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
