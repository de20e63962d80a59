use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::types::DEFAULT_FRESHNESS_WINDOW;

/// Configuration errors. Fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Upstream market data configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Base URL of the quote API.
    pub api_url: String,
    /// API key appended to each quote request.
    pub api_key: String,
    /// Interval between market data refresh ticks.
    pub update_interval: Duration,
    /// Timeout for a single quote request.
    pub request_timeout: Duration,
    /// Maximum number of quote requests in flight during one tick.
    pub max_concurrent_fetches: usize,
}

/// Margin sweep configuration.
#[derive(Debug, Clone)]
pub struct MarginConfig {
    /// Interval between margin sweep ticks.
    pub update_interval: Duration,
    /// Maximum number of clients evaluated concurrently during one sweep.
    pub max_concurrent_evaluations: usize,
    /// Maximum age of a price used for valuation.
    pub price_freshness: Duration,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database file.
    pub database_path: String,
    pub market: MarketConfig,
    pub margin: MarginConfig,
    /// Origins allowed by CORS.
    pub cors_allowed_origins: Vec<String>,
    /// Requests allowed per client IP per minute.
    pub rate_limit_per_minute: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: v,
            })?,
            None => 8080,
        };

        let market = MarketConfig {
            api_url: get("MARKET_DATA_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .ok_or(ConfigError::Missing("MARKET_DATA_API_URL"))?,
            api_key: get("MARKET_DATA_API_KEY").ok_or(ConfigError::Missing("MARKET_DATA_API_KEY"))?,
            update_interval: duration_var(
                get("MARKET_DATA_UPDATE_INTERVAL"),
                "MARKET_DATA_UPDATE_INTERVAL",
                Duration::from_secs(60),
            )?,
            request_timeout: duration_var(
                get("MARKET_DATA_TIMEOUT"),
                "MARKET_DATA_TIMEOUT",
                Duration::from_secs(10),
            )?,
            max_concurrent_fetches: count_var(
                get("MARKET_DATA_MAX_CONCURRENCY"),
                "MARKET_DATA_MAX_CONCURRENCY",
                4,
            )?,
        };

        let margin = MarginConfig {
            update_interval: duration_var(
                get("MARGIN_UPDATE_INTERVAL"),
                "MARGIN_UPDATE_INTERVAL",
                Duration::from_secs(60),
            )?,
            max_concurrent_evaluations: count_var(
                get("MARGIN_MAX_CONCURRENCY"),
                "MARGIN_MAX_CONCURRENCY",
                8,
            )?,
            price_freshness: duration_var(
                get("PRICE_FRESHNESS_WINDOW"),
                "PRICE_FRESHNESS_WINDOW",
                DEFAULT_FRESHNESS_WINDOW,
            )?,
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]);

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "minirisk.db".to_string()),
            market,
            margin,
            cors_allowed_origins,
            rate_limit_per_minute: count_var(
                get("RATE_LIMIT_PER_MINUTE"),
                "RATE_LIMIT_PER_MINUTE",
                100,
            )?,
        })
    }
}

fn duration_var(
    value: Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(v) => parse_duration(&v).ok_or(ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

fn count_var(
    value: Option<String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    match value {
        Some(v) => match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid { key, value: v }),
        },
        None => Ok(default),
    }
}

/// Longest accepted interval, timeout or freshness window.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

/// Parse `500ms`, `30s`, `5m`, `1h` or a bare number of seconds.
/// Zero durations and durations above [`MAX_DURATION`] are rejected.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let n: u64 = number.parse().ok()?;

    let duration = match unit {
        "" | "s" => Duration::from_secs(n),
        "ms" => Duration::from_millis(n),
        "m" => Duration::from_secs(n.checked_mul(60)?),
        "h" => Duration::from_secs(n.checked_mul(3600)?),
        _ => return None,
    };

    if duration.is_zero() || duration > MAX_DURATION {
        None
    } else {
        Some(duration)
    }
}
