//! Environment-driven server configuration.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {detail}")]
    Invalid { var: &'static str, detail: String },
}

/// Everything the server reads from the environment, parsed up front so a
/// bad value fails the process at startup rather than at first request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Shared secret the platform signs deliveries with. Absent means the
    /// webhook endpoint fails closed.
    pub webhook_secret: Option<String>,
    /// Access token for the drain and stats endpoints; they are open when
    /// none is configured.
    pub drain_secret: Option<String>,
    pub addr_limit: u32,
    pub identity_limit: u32,
    pub rate_window: Duration,
    /// Age after which a claimed-but-unfinished job becomes reclaimable.
    pub stale_after: Duration,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            webhook_secret: None,
            drain_secret: None,
            addr_limit: 120,
            identity_limit: 60,
            rate_window: Duration::from_secs(60),
            stale_after: Duration::from_secs(300),
            database_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            webhook_secret: non_empty(std::env::var("WEBHOOK_SECRET").ok()),
            drain_secret: non_empty(std::env::var("DRAIN_SECRET").ok()),
            addr_limit: parse_var("RATE_LIMIT_PER_ADDR", defaults.addr_limit)?,
            identity_limit: parse_var("RATE_LIMIT_PER_SHOP", defaults.identity_limit)?,
            rate_window: Duration::from_secs(parse_nonzero("RATE_LIMIT_WINDOW_SECS", 60)?),
            stale_after: Duration::from_secs(parse_nonzero("JOB_STALE_AFTER_SECS", 300)?),
            database_url: non_empty(std::env::var("DATABASE_URL").ok()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            var,
            detail: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_nonzero(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value: u64 = parse_var(var, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            detail: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
