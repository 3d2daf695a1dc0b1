//! Server configuration read from environment variables.
//!
//! - `OPLOCK_DB_PATH`: SQLite database file path (unset: in-memory store)
//! - `OPLOCK_PORT`: listen port (default `3000`)
//! - `OPLOCK_STALE_AFTER_SECS`: lock staleness threshold (default `300`)
//! - `OPLOCK_EXEMPT_ADMIN_BLOCKS`: administrative blocks never go stale
//!   (default `false`)
//! - `OPLOCK_DEBUG_ENDPOINT`: serve `GET /locks/debug` (default `true`)

use std::time::Duration;

use crate::coordinator::StalenessPolicy;

pub const ENV_DB_PATH: &str = "OPLOCK_DB_PATH";
pub const ENV_PORT: &str = "OPLOCK_PORT";
pub const ENV_STALE_AFTER_SECS: &str = "OPLOCK_STALE_AFTER_SECS";
pub const ENV_EXEMPT_ADMIN_BLOCKS: &str = "OPLOCK_EXEMPT_ADMIN_BLOCKS";
pub const ENV_DEBUG_ENDPOINT: &str = "OPLOCK_DEBUG_ENDPOINT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// SQLite file backing the lock table; `None` keeps locks in memory.
    pub db_path: Option<String>,
    pub port: u16,
    pub staleness: StalenessPolicy,
    pub debug_endpoint: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            db_path: None,
            port: 3000,
            staleness: StalenessPolicy::default(),
            debug_endpoint: true,
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ServerConfig::default();
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(ENV_PORT) {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: ENV_PORT,
                expected: "a port number",
                value,
            })?,
            None => defaults.port,
        };

        let threshold = match get(ENV_STALE_AFTER_SECS) {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: ENV_STALE_AFTER_SECS,
                        expected: "a positive number of seconds",
                        value,
                    })
                }
            },
            None => defaults.staleness.threshold,
        };

        let exempt_administrative = match get(ENV_EXEMPT_ADMIN_BLOCKS) {
            Some(value) => parse_bool(ENV_EXEMPT_ADMIN_BLOCKS, value)?,
            None => defaults.staleness.exempt_administrative,
        };

        let debug_endpoint = match get(ENV_DEBUG_ENDPOINT) {
            Some(value) => parse_bool(ENV_DEBUG_ENDPOINT, value)?,
            None => defaults.debug_endpoint,
        };

        Ok(ServerConfig {
            db_path: get(ENV_DB_PATH),
            port,
            staleness: StalenessPolicy {
                threshold,
                exempt_administrative,
            },
            debug_endpoint,
        })
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "true or false",
            value,
        }),
    }
}
