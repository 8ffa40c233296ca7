use std::time::Duration;

use crate::{Error, Result};

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_ENV: &str = "RILLFIND_MAX_CONNECTIONS";
pub const CONNECT_TIMEOUT_ENV: &str = "RILLFIND_CONNECT_TIMEOUT_MS";
pub const SLOW_QUERY_ENV: &str = "RILLFIND_SLOW_QUERY_MS";

/// Connection and logging settings, usually read once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    pub database_url: String,
    pub max_connections: Option<u32>,
    pub connect_timeout: Option<Duration>,
    /// Calls slower than this are logged on `rillfind::slow_query`.
    pub slow_query_threshold: Duration,
}

impl BackendConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: None,
            connect_timeout: None,
            slow_query_threshold: Duration::from_millis(500),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(DATABASE_URL_ENV)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Backend(format!("{DATABASE_URL_ENV} is not set")))?;
        let mut config = Self::new(url);
        if let Some(max) = lookup(MAX_CONNECTIONS_ENV) {
            config.max_connections = Some(parse_number(MAX_CONNECTIONS_ENV, &max)? as u32);
        }
        if let Some(ms) = lookup(CONNECT_TIMEOUT_ENV) {
            config.connect_timeout = Some(Duration::from_millis(parse_number(
                CONNECT_TIMEOUT_ENV,
                &ms,
            )?));
        }
        if let Some(ms) = lookup(SLOW_QUERY_ENV) {
            config.slow_query_threshold = Duration::from_millis(parse_number(SLOW_QUERY_ENV, &ms)?);
        }
        Ok(config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Backend(format!("{key}={value:?} is not a number: {e}")))
}
