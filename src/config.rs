use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::roster::{DEFAULT_ROSTER_API_URL, RosterConfig};
use crate::text::normalize_term;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// Catalog reconciliation configuration.
#[derive(Debug, Clone)]
pub struct TrawlConfig {
    /// Cap on concurrent subject fetches and concurrent course writes.
    pub concurrency: usize,
    /// Items between progress events.
    pub progress_interval: usize,
}

impl Default for TrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            progress_interval: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
            timeout: Duration::from_millis(5000),
        }
    }
}

/// Periodic reconciliation of a fixed set of terms.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub terms: Vec<String>,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db: DbConfig,
    pub roster: RosterConfig,
    pub trawl: TrawlConfig,
    pub search: SearchConfig,
    pub scheduler: Option<SchedulerConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset keys take
    /// their defaults; set but unparsable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://chequerd.db".to_string());
        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?;

        let db = DbConfig {
            max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DbConfig::default().max_connections,
            )?,
        };

        let roster_defaults = RosterConfig::default();
        let roster = RosterConfig {
            base_url: lookup("ROSTER_API_URL")
                .unwrap_or_else(|| DEFAULT_ROSTER_API_URL.to_string()),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "ROSTER_TIMEOUT_SECS",
                roster_defaults.timeout.as_secs(),
            )?),
            max_retries: parse_or(&lookup, "ROSTER_MAX_RETRIES", roster_defaults.max_retries)?,
            retry_base_delay: roster_defaults.retry_base_delay,
        };

        let trawl = TrawlConfig {
            concurrency: positive(
                parse_or(&lookup, "TRAWL_CONCURRENCY", TrawlConfig::default().concurrency)?,
                "TRAWL_CONCURRENCY",
            )?,
            ..TrawlConfig::default()
        };

        let search_defaults = SearchConfig::default();
        let search = SearchConfig {
            default_limit: positive(
                parse_or(&lookup, "SEARCH_DEFAULT_LIMIT", search_defaults.default_limit)?,
                "SEARCH_DEFAULT_LIMIT",
            )?,
            max_limit: positive(
                parse_or(&lookup, "SEARCH_MAX_LIMIT", search_defaults.max_limit)?,
                "SEARCH_MAX_LIMIT",
            )?,
            timeout: Duration::from_millis(parse_or(
                &lookup,
                "SEARCH_TIMEOUT_MS",
                search_defaults.timeout.as_millis() as u64,
            )?),
        };

        let terms: Vec<String> = lookup("TRAWL_TERMS")
            .unwrap_or_default()
            .split(',')
            .map(normalize_term)
            .filter(|t| !t.is_empty())
            .collect();
        let scheduler = if terms.is_empty() {
            None
        } else {
            Some(SchedulerConfig {
                terms,
                interval: Duration::from_secs(positive(
                    parse_or(&lookup, "TRAWL_INTERVAL_SECS", 86_400u64)?,
                    "TRAWL_INTERVAL_SECS",
                )?),
            })
        };

        Ok(Self {
            database_url,
            bind_addr,
            db,
            roster,
            trawl,
            search,
            scheduler,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive<T>(value: T, key: &'static str) -> Result<T, ConfigError>
where
    T: Copy + Default + PartialEq + Display,
{
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
