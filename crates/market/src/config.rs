//! Market configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `MARKET_CART_CAPACITY` - max carts held in the cache (default: 10000)
//! - `MARKET_CART_TTL_SECS` - cart idle lifetime in seconds (default: 86400)
//! - `MARKET_STORAGE_TIMEOUT_MS` - per-call storage deadline during checkout
//!   in milliseconds (default: 5000)
//! - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USERNAME` / `SMTP_PASSWORD` /
//!   `SMTP_FROM` - outbound mail relay; notification dispatch is disabled
//!   when `SMTP_HOST` is unset

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Marketplace core configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Maximum number of carts held in the cache
    pub cart_capacity: u64,
    /// Idle lifetime of a cart before it is dropped
    pub cart_ttl: Duration,
    /// Deadline applied to each storage call during checkout
    pub storage_timeout: Duration,
    /// Outbound mail relay; `None` disables notification delivery
    pub smtp: Option<SmtpConfig>,
}

/// SMTP relay configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Sender address for all notifications
    pub from_address: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl MarketConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails
    /// to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = SecretString::from(require("MARKET_DATABASE_URL")?);

        let cart_capacity = parse_or("MARKET_CART_CAPACITY", 10_000)?;
        let cart_ttl = Duration::from_secs(parse_or("MARKET_CART_TTL_SECS", 86_400)?);
        let storage_timeout =
            Duration::from_millis(parse_or("MARKET_STORAGE_TIMEOUT_MS", 5_000)?);

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                username: require("SMTP_USERNAME")?,
                password: SecretString::from(require("SMTP_PASSWORD")?),
                from_address: require("SMTP_FROM")?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            cart_capacity,
            cart_ttl,
            storage_timeout,
            smtp,
        })
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_owned()))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar(name.to_owned(), value)),
        Err(_) => Ok(default),
    }
}
