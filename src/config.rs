//! Server configuration parsed from environment variables.
//!
//! Every subsystem parses its own settings through a [`Lookup`] so tests can
//! feed a fixed map instead of mutating the process environment.

use std::collections::HashMap;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Key → value source. Production uses [`env_lookup`].
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Read a variable from the process environment.
#[must_use]
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Build a lookup over a fixed set of pairs. Used by tests across the crate.
#[must_use]
pub fn map_lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

/// Parse `key` or fall back to `default` when absent or malformed.
pub fn parse_or<T: FromStr>(lookup: Lookup<'_>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// `"true"` in any case is on; any other present value is off.
pub fn flag_or(lookup: Lookup<'_>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| v.trim().eq_ignore_ascii_case("true"))
}

/// Non-empty trimmed value, or `None`.
pub fn non_empty(lookup: Lookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub log_level: tracing::Level,
}

impl ServerConfig {
    /// Load server settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or `PORT` is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    /// Load server settings from an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or `PORT` is malformed.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let database_url = non_empty(lookup, "DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            database_url,
            port,
            db_max_connections: parse_or(lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            log_level: parse_log_level(lookup("LOG_LEVEL").as_deref()),
        })
    }
}

/// Map `LOG_LEVEL` to a tracing level. Unknown values fall back to INFO.
#[must_use]
pub fn parse_log_level(raw: Option<&str>) -> tracing::Level {
    match raw.map(|v| v.trim().to_ascii_uppercase()).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARN" | "WARNING") => tracing::Level::WARN,
        Some("ERROR" | "CRITICAL") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
