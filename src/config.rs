//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString to
//! prevent log leaks.

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::time::Duration;

/// Queue behavior knobs, independent of where the store lives.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// When true, `finish_request` deletes the entry instead of marking it
    /// Completed.
    pub delete_on_complete: bool,
    /// How often `next_request` re-checks an empty queue while waiting.
    pub poll_interval: Duration,
    /// Wait bound used by `next_request_default`.
    pub default_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            delete_on_complete: false,
            poll_interval: Duration::from_millis(500),
            default_timeout: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub queue: QueueOptions,
    pub log_level: String,
}

impl Config {
    /// Load `.env` (if present), then read configuration from the
    /// environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        let mut queue = QueueOptions::default();
        if let Ok(raw) = std::env::var("QUEUE_DELETE_ON_COMPLETE") {
            queue.delete_on_complete = parse_var("QUEUE_DELETE_ON_COMPLETE", &raw)?;
        }
        if let Ok(raw) = std::env::var("QUEUE_POLL_INTERVAL_MS") {
            queue.poll_interval = Duration::from_millis(parse_var("QUEUE_POLL_INTERVAL_MS", &raw)?);
        }
        if let Ok(raw) = std::env::var("QUEUE_DEFAULT_TIMEOUT_MS") {
            queue.default_timeout =
                Duration::from_millis(parse_var("QUEUE_DEFAULT_TIMEOUT_MS", &raw)?);
        }

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            queue,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}")))
}
