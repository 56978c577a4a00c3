//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;

use stockledger_observability::{LogConfig, LogFormat};

pub const DATABASE_URL: &str = "STOCKLEDGER_DATABASE_URL";
pub const FALLBACK_DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "STOCKLEDGER_DB_MAX_CONNECTIONS";
pub const LOCK_TIMEOUT_MS: &str = "STOCKLEDGER_LOCK_TIMEOUT_MS";
pub const RECONCILE_RETRIES: &str = "STOCKLEDGER_RECONCILE_RETRIES";
pub const LOG_FORMAT: &str = "STOCKLEDGER_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Only required by the Postgres store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Longest a transaction waits on a locked balance row.
    pub lock_timeout: Duration,
    /// Extra attempts for a reconciliation that hit a conflict.
    pub reconcile_retries: u32,
    pub log: LogConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            lock_timeout: Duration::from_millis(5_000),
            reconcile_retries: 3,
            log: LogConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let database_url = get(DATABASE_URL).or_else(|| get(FALLBACK_DATABASE_URL));

        let max_connections = match get(DB_MAX_CONNECTIONS) {
            Some(raw) => match parse_number::<u32>(DB_MAX_CONNECTIONS, &raw)? {
                0 => return Err(invalid(DB_MAX_CONNECTIONS, &raw, "must be at least 1")),
                n => n,
            },
            None => defaults.max_connections,
        };

        let lock_timeout = match get(LOCK_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse_number::<u64>(LOCK_TIMEOUT_MS, &raw)?),
            None => defaults.lock_timeout,
        };

        let reconcile_retries = match get(RECONCILE_RETRIES) {
            Some(raw) => parse_number::<u32>(RECONCILE_RETRIES, &raw)?,
            None => defaults.reconcile_retries,
        };

        let format = match get(LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| invalid(LOG_FORMAT, &raw, &e.to_string()))?,
            None => defaults.log.format,
        };

        Ok(Self {
            database_url,
            max_connections,
            lock_timeout,
            reconcile_retries,
            log: defaults.log.with_format(format),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing(DATABASE_URL))
    }
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| invalid(var, raw, &e.to_string()))
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
